use clap::Subcommand;

use super::context::AppContext;
use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account, then sign in with it
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Close the backend session and forget the stored one
    Signout,
    /// Show who is signed in
    Status,
}

pub async fn run(action: AuthAction) -> CommandResult {
    let ctx = AppContext::connect().await?;

    match action {
        AuthAction::Signin { email, password } => {
            // Appwrite refuses a new session while one is active.
            if ctx.session.is_authenticated() {
                ctx.session.sign_out().await?;
            }
            let user = ctx.session.sign_in(&email, &password).await?;
            ctx.persist_session()?;
            print_json(&user)?;
        }
        AuthAction::Signup { email, password } => {
            if ctx.session.is_authenticated() {
                ctx.session.sign_out().await?;
            }
            let user = ctx.session.sign_up(&email, &password).await?;
            ctx.persist_session()?;
            print_json(&user)?;
        }
        AuthAction::Signout => {
            if ctx.session.is_authenticated() {
                ctx.session.sign_out().await?;
            }
            ctx.forget_session()?;
            print_json(&ctx.session.state())?;
        }
        AuthAction::Status => {
            print_json(&ctx.session.state())?;
        }
    }
    Ok(())
}
