use anyhow::Context;
use agora_api::{AuthToken, NewSession, User, UserId, Uuid};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,
    },

    /// List the users known to the server
    ListUsers {
        /// Username to log in as
        name: String,

        /// Password
        password: String,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
        } => {
            client
                .post(format!("{}/api/admin/create-user", opt.host))
                .json(&agora_api::NewUser::new(
                    UserId(Uuid::new_v4()),
                    name,
                    initial_password,
                ))
                .bearer_auth(admin_token()?.0)
                .send()
                .await?
                .error_for_status()?;
        }
        Command::ListUsers { name, password } => {
            let token: AuthToken = client
                .post(format!("{}/api/auth", opt.host))
                .json(&NewSession::new(
                    name,
                    password,
                    String::from("agora-ctl"),
                ))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .context("parsing session token")?;
            let users: Vec<User> = client
                .get(format!("{}/api/fetch-users", opt.host))
                .bearer_auth(token.0)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .context("parsing user list")?;
            for user in users {
                println!("{}\t{}", user.id.0, user.name);
            }
            client
                .post(format!("{}/api/unauth", opt.host))
                .bearer_auth(token.0)
                .send()
                .await?
                .error_for_status()?;
        }
    }

    Ok(())
}
