//! Prints a seedable JSON store snapshot on stdout: random users,
//! messages (with replies, reactions and delivery states) and polls
//! whose tallies respect the vote-once invariant.

use std::collections::HashMap;

use agora_api::{DeliveryState, Message, MessageId, NewUser, Poll, Reaction, User, UserId};
use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 4;
const NUM_MESSAGES: usize = 40;
const NUM_POLLS: usize = 3;

const MESSAGE_WORD_COUNT: usize = 12;
const QUESTION_WORD_COUNT: usize = 6;
const OPTION_WORD_COUNT: usize = 2;
const REPLY_PROBABILITY: f64 = 0.2;
const REACTION_PROBABILITY: f64 = 0.3;
const EMOJIS: &[&str] = &["👍", "❤", "🎉", "😂"];

const INITIAL_PASSWORD: &str = "changeme";

fn gen_users(rng: &mut impl Rng) -> Vec<User> {
    (0..NUM_USERS)
        .map(|i| {
            let word = lipsum::lipsum_words_from_seed(1, rng.gen());
            User {
                id: UserId(Uuid::new_v4()),
                name: format!("{}{}", word.trim_end_matches('.'), i),
            }
        })
        .collect()
}

fn gen_messages(rng: &mut impl Rng, users: &[User]) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::with_capacity(NUM_MESSAGES);
    let start = Utc::now() - Duration::hours(24);
    for i in 0..NUM_MESSAGES {
        let author = users.choose(rng).expect("at least one user");
        let reply_to = match !messages.is_empty() && rng.gen_bool(REPLY_PROBABILITY) {
            true => messages.choose(rng).map(|m| m.id),
            false => None,
        };
        let status = *[
            DeliveryState::Sent,
            DeliveryState::Delivered,
            DeliveryState::Seen,
        ]
        .choose(rng)
        .expect("non-empty state list");
        let reactions = users
            .iter()
            .filter_map(|u| {
                rng.gen_bool(REACTION_PROBABILITY).then(|| Reaction {
                    emoji: String::from(*EMOJIS.choose(rng).expect("non-empty emoji list")),
                    user: u.name.clone(),
                })
            })
            .collect();
        messages.push(Message {
            id: MessageId(Uuid::new_v4()),
            author: author.name.clone(),
            text: lipsum::lipsum_words_from_seed(MESSAGE_WORD_COUNT, rng.gen()),
            created_at: start + Duration::seconds(i as i64 * 60 + rng.gen_range(0..60)),
            reply_to,
            status,
            reactions,
        });
    }
    messages
}

fn gen_polls(rng: &mut impl Rng, users: &[User]) -> Vec<Poll> {
    (0..NUM_POLLS)
        .map(|_| {
            let creator = users.choose(rng).expect("at least one user");
            let num_options = rng.gen_range(2..=4);
            let options = (0..num_options)
                .map(|_| lipsum::lipsum_words_from_seed(OPTION_WORD_COUNT, rng.gen()))
                .collect();
            let mut poll = Poll::new(
                lipsum::lipsum_words_from_seed(QUESTION_WORD_COUNT, rng.gen()),
                options,
                creator.id,
            );
            // each voter casts exactly one vote, keeping tallies consistent
            for user in users {
                if rng.gen_bool(0.5) {
                    let option = poll
                        .options
                        .choose(rng)
                        .expect("at least two options")
                        .id
                        .clone();
                    poll.register_vote(user.id, &option)
                        .expect("voter is fresh");
                }
            }
            poll
        })
        .collect()
}

fn main() {
    let mut rng = rand::thread_rng();

    let users = gen_users(&mut rng);
    let messages = gen_messages(&mut rng, &users);
    let polls = gen_polls(&mut rng, &users);

    let new_users: Vec<NewUser> = users
        .iter()
        .map(|u| NewUser::new(u.id, u.name.clone(), String::from(INITIAL_PASSWORD)))
        .collect();
    let user_status: HashMap<&str, bool> = users
        .iter()
        .map(|u| (u.name.as_str(), rng.gen_bool(0.5)))
        .collect();
    let messages: HashMap<String, &Message> = messages
        .iter()
        .map(|m| (m.id.0.to_string(), m))
        .collect();
    let polls: HashMap<String, &Poll> =
        polls.iter().map(|p| (p.id.0.to_string(), p)).collect();

    let snapshot = serde_json::json!({
        "users": new_users,
        "store": {
            "messages": messages,
            "typing": {},
            "userStatus": user_status,
            "polls": polls,
        },
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).expect("serializing snapshot"),
    );
}
