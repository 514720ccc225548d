use std::collections::HashSet;

use uuid::Uuid;

use crate::{Error, UserId, STUB_UUID};

/// How many polls a single principal may have live at once.
pub const MAX_POLLS_PER_CREATOR: usize = 4;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct PollId(pub Uuid);

impl PollId {
    pub fn stub() -> PollId {
        PollId(STUB_UUID)
    }
}

/// Option ids are the creation position rendered as a string ("0", "1", …)
/// and stay stable for as long as the position survives edits.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OptionId(pub String);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
    pub votes: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_by: UserId,
    #[serde(default)]
    pub voted_by: HashSet<UserId>,
}

impl Poll {
    pub fn new(question: String, options: Vec<String>, created_by: UserId) -> Poll {
        Poll {
            id: PollId(Uuid::new_v4()),
            question,
            options: options
                .into_iter()
                .enumerate()
                .map(|(idx, text)| PollOption {
                    id: OptionId(idx.to_string()),
                    text,
                    votes: 0,
                })
                .collect(),
            created_by,
            voted_by: HashSet::new(),
        }
    }

    /// Replaces the question and the option texts. Options are matched by
    /// position: a surviving position keeps its id and vote count, a new
    /// position starts from zero. Shrinking or reordering therefore drops
    /// or shifts tallies; callers wanting to preserve them must keep
    /// positions stable.
    pub fn apply_edit(&mut self, question: String, options: Vec<String>) {
        self.question = question;
        self.options = options
            .into_iter()
            .enumerate()
            .map(|(idx, text)| match self.options.get(idx) {
                Some(existing) => PollOption {
                    id: existing.id.clone(),
                    text,
                    votes: existing.votes,
                },
                None => PollOption {
                    id: OptionId(idx.to_string()),
                    text,
                    votes: 0,
                },
            })
            .collect();
    }

    /// Records one vote, enforcing the vote-once invariant: a principal
    /// already present in `voted_by` can never increment a tally again.
    pub fn register_vote(&mut self, voter: UserId, option: &OptionId) -> Result<(), Error> {
        if self.voted_by.contains(&voter) {
            return Err(Error::AlreadyVoted(self.id));
        }
        let opt = self
            .options
            .iter_mut()
            .find(|o| o.id == *option)
            .ok_or_else(|| Error::UnknownOption(option.0.clone()))?;
        opt.votes += 1;
        self.voted_by.insert(voter);
        Ok(())
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    /// Per-option tally share for rendering, in the same order as
    /// `options`. All zeros when nobody voted yet, never NaN.
    pub fn percentages(&self) -> Vec<f64> {
        let total = self.total_votes();
        self.options
            .iter()
            .map(|o| match total {
                0 => 0.0,
                _ => o.votes as f64 * 100.0 / total as f64,
            })
            .collect()
    }
}
