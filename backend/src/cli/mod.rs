//! Command line interface.
//!
//! `serve` runs the HTTP API; the other commands administer accounts and
//! tokens against the configured store without going through HTTP.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::services::seed_service::{SeedService, DEFAULT_SEED_PASSWORD};
use crate::services::token_service::TokenService;
use crate::services::user_service::{CreateUser, UserService};
use crate::storage::CatalogueStore;

/// ISA metadata catalogue
#[derive(Parser, Debug)]
#[command(name = "isa-catalogue", version)]
#[command(about = "Catalogue of investigations, studies and assays", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The requested command, `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Run migrations and start the HTTP server
    Serve,

    /// Create a user account
    CreateUser {
        username: String,

        #[arg(long, default_value = "")]
        email: String,

        /// Without a password the account can only use an API token
        #[arg(long, env = "ISA_USER_PASSWORD")]
        password: Option<String>,

        #[arg(long)]
        staff: bool,

        #[arg(long)]
        superuser: bool,
    },

    /// Print a user's API token, creating it when missing
    GenerateToken {
        username: String,

        /// Replace the existing token with a new key
        #[arg(long)]
        regenerate: bool,
    },

    /// List all API tokens
    ListTokens {
        /// Print full keys instead of the first 8 characters
        #[arg(long)]
        show_keys: bool,
    },

    /// Create demo users and one investigation per security level
    SeedTestdata {
        #[arg(long, default_value = DEFAULT_SEED_PASSWORD)]
        password: String,
    },
}

impl std::fmt::Debug for Command {
    // Keeps `--password` out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Serve => f.write_str("Serve"),
            Command::CreateUser { username, .. } => {
                f.debug_struct("CreateUser").field("username", username).finish_non_exhaustive()
            }
            Command::GenerateToken { username, regenerate } => f
                .debug_struct("GenerateToken")
                .field("username", username)
                .field("regenerate", regenerate)
                .finish(),
            Command::ListTokens { show_keys } => {
                f.debug_struct("ListTokens").field("show_keys", show_keys).finish()
            }
            Command::SeedTestdata { .. } => f.write_str("SeedTestdata"),
        }
    }
}

/// Run an administrative command. `serve` is handled by the binary.
pub async fn run(store: Arc<dyn CatalogueStore>, command: Command) -> Result<()> {
    match command {
        Command::Serve => Ok(()),
        Command::CreateUser {
            username,
            email,
            password,
            staff,
            superuser,
        } => {
            let user = UserService::new(store)
                .create(CreateUser {
                    username,
                    email,
                    password,
                    is_staff: staff,
                    is_superuser: superuser,
                    ..Default::default()
                })
                .await?;
            println!("Created user {} ({})", user.username, user.id);
            Ok(())
        }
        Command::GenerateToken {
            username,
            regenerate,
        } => {
            let issued = TokenService::new(store)
                .issue_for_username(&username, regenerate)
                .await?;
            let verb = if issued.created { "Generated" } else { "Existing" };
            println!("{} token for {}: {}", verb, username, issued.token.key);
            println!();
            println!("Use it as: Authorization: Token {}", issued.token.key);
            Ok(())
        }
        Command::ListTokens { show_keys } => {
            let tokens = TokenService::new(store).list(show_keys).await?;
            if tokens.is_empty() {
                println!("No API tokens.");
                return Ok(());
            }
            println!("{:<24} {:<44} CREATED", "USERNAME", "KEY");
            for token in tokens {
                println!(
                    "{:<24} {:<44} {}",
                    token.username,
                    token.key,
                    token.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Command::SeedTestdata { password } => {
            let summary = SeedService::new(store).seed(&password).await?;
            for username in &summary.users_created {
                println!("Created user {}", username);
            }
            for username in &summary.users_existing {
                println!("User {} already exists", username);
            }
            println!("Created records: {}", summary.records.join(", "));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::parse_from(["isa-catalogue"]);
        assert!(matches!(cli.command(), Command::Serve));
    }

    #[test]
    fn test_create_user_flags() {
        let cli = Cli::parse_from([
            "isa-catalogue",
            "create-user",
            "alice",
            "--email",
            "alice@example.org",
            "--staff",
        ]);
        match cli.command() {
            Command::CreateUser {
                username,
                email,
                staff,
                superuser,
                ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(email, "alice@example.org");
                assert!(staff);
                assert!(!superuser);
            }
            _ => panic!("expected create-user"),
        }
    }

    #[test]
    fn test_list_tokens_flag() {
        let cli = Cli::parse_from(["isa-catalogue", "list-tokens", "--show-keys"]);
        assert!(matches!(cli.command(), Command::ListTokens { show_keys: true }));
    }

    #[tokio::test]
    async fn test_generate_token_for_unknown_user_fails() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        let err = run(
            store,
            Command::GenerateToken {
                username: "ghost".into(),
                regenerate: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_create_user_then_generate_token() {
        let store: Arc<dyn CatalogueStore> = Arc::new(MemoryStore::new());
        run(
            store.clone(),
            Command::CreateUser {
                username: "bob".into(),
                email: "bob@example.org".into(),
                password: None,
                staff: false,
                superuser: false,
            },
        )
        .await
        .unwrap();
        run(
            store.clone(),
            Command::GenerateToken {
                username: "bob".into(),
                regenerate: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(store.list_tokens().await.unwrap().len(), 1);
    }
}
