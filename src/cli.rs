use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "guidebot")]
#[command(author, version, about = "Pushes new guide requests to Telegram and collects guide replies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with the listener and the backup poller (default)
    Run,

    /// Apply database migrations and exit
    Migrate,

    /// Fan out one request now, then exit
    Dispatch {
        /// Request id (UUID)
        request_id: Uuid,
    },

    /// Run a single backup-poller scan, then exit
    PollOnce {
        /// How far back to look, in seconds (defaults to POLL_LOOKBACK_SECS)
        #[arg(long)]
        lookback_secs: Option<i64>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["guidebot"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_dispatch_takes_a_uuid() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["guidebot", "dispatch", &id.to_string()]).unwrap();
        assert_eq!(cli.command, Some(Commands::Dispatch { request_id: id }));

        assert!(Cli::try_parse_from(["guidebot", "dispatch", "R-7KQ2"]).is_err());
    }

    #[test]
    fn test_poll_once_lookback() {
        let cli = Cli::try_parse_from(["guidebot", "poll-once", "--lookback-secs", "3600"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::PollOnce {
                lookback_secs: Some(3600)
            })
        );
    }
}
