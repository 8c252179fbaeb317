use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "bibcomplete",
    about = "Discover bibliographies and complete citation keys"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Suggest citation keys matching a query
    Suggest(SuggestArgs),
    /// Show the bibliography files that would be searched
    Sources(SourcesArgs),
    /// Manage configured bibliography files
    Bib {
        #[command(subcommand)]
        action: BibAction,
    },
    /// Manage stored settings
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Host state shared by commands that resolve bibliographies.
#[derive(Debug, Clone, Parser)]
pub struct ResolveArgs {
    /// The document being edited
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Discovery strategy to run, in order (name or letter: b, c, l, t, g)
    #[arg(short, long = "source")]
    pub sources: Vec<String>,

    /// Bibliography extension for same-name and current-dir discovery
    #[arg(short, long = "ext")]
    pub extensions: Vec<String>,
}

// -- Suggest --

#[derive(Debug, Parser)]
pub struct SuggestArgs {
    /// The partial citation text typed so far
    #[arg(default_value = "")]
    pub query: String,

    /// Search only these bibliography files, skipping discovery
    #[arg(short, long = "bib")]
    pub bibliographies: Vec<PathBuf>,

    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Record field to match against (repeatable)
    #[arg(short, long = "field")]
    pub fields: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Sources --

#[derive(Debug, Parser)]
pub struct SourcesArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Bib subcommands --

#[derive(Debug, Subcommand)]
pub enum BibAction {
    /// Add a bibliography file to the configured list
    Add {
        /// Path to the bibliography file
        path: PathBuf,
    },
    /// Remove a bibliography file from the configured list
    Remove {
        /// Path as shown by `bib list`
        path: PathBuf,
    },
    /// List configured bibliography files
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Setting subcommands --

#[derive(Debug, Subcommand)]
pub enum SettingAction {
    /// Show effective settings
    Show {
        /// Only this key
        key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// Clear a stored setting (revert to default)
    Clear {
        /// Setting key
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "bibcomplete",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_suggest_defaults() {
        let cli = Cli::parse_from(["bibcomplete", "suggest", "doe"]);
        match cli.command {
            Command::Suggest(args) => {
                assert_eq!(args.query, "doe");
                assert!(args.bibliographies.is_empty());
                assert!(args.resolve.document.is_none());
                assert!(args.resolve.sources.is_empty());
                assert!(args.fields.is_empty());
                assert!(!args.json);
            }
            _ => panic!("expected suggest command"),
        }
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn parse_suggest_repeated_flags() {
        let cli = Cli::parse_from([
            "bibcomplete",
            "-vv",
            "suggest",
            "smith 2020",
            "--document",
            "paper.md",
            "--source",
            "b",
            "--source",
            "current-dir",
            "--ext",
            "bib",
            "--field",
            "title",
            "--bib",
            "a.json",
            "--json",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Suggest(args) = cli.command else {
            panic!("expected suggest command");
        };
        assert_eq!(args.resolve.document, Some(PathBuf::from("paper.md")));
        assert_eq!(args.resolve.sources, ["b", "current-dir"]);
        assert_eq!(args.resolve.extensions, ["bib"]);
        assert_eq!(args.fields, ["title"]);
        assert_eq!(args.bibliographies, [PathBuf::from("a.json")]);
        assert!(args.json);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["bibcomplete", "-q", "-v", "sources"]).is_err());
        let cli = Cli::parse_from(["bibcomplete", "sources", "-q"]);
        assert!(cli.quiet);
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
