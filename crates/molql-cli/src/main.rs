//! MolQL CLI
//!
//! Converts queries between syntaxes and checks them against the built-in
//! symbol table.

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use molql::{AUTO_FORMAT, DumpOptions, Query, global_symbols, global_syntaxes, validate};

#[derive(Parser)]
#[command(name = "molql")]
#[command(about = "Molecular structure query converter")]
#[command(after_help = "\
EXAMPLES:
    # Residue ranges as a MolQL script
    molql convert 'B.18-20' --from range --to molql --indent 2

    # Script to JSON, reading the query from stdin
    echo '(structure.generator.atom-groups)' | molql convert - --to json

    # Parse and resolve every symbol without running the query
    molql check query.json --from json
")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite a query in another syntax
    Convert {
        /// Query text, a path to a query file, or `-` for stdin
        query: String,

        /// Syntax of the input (`auto` guesses from the first character)
        #[arg(long, default_value = AUTO_FORMAT)]
        from: String,

        /// Syntax to write
        #[arg(long)]
        to: String,

        /// Pretty-print: spaces per level for json, base indent for molql
        /// (each nested molql level adds 2)
        #[arg(long)]
        indent: Option<usize>,
    },

    /// List registered syntaxes
    Syntaxes,

    /// Parse a query and validate it against the built-in symbols
    Check {
        /// Query text, a path to a query file, or `-` for stdin
        query: String,

        #[arg(long, default_value = AUTO_FORMAT)]
        from: String,
    },
}

fn load_query(source: &str, format: &str) -> anyhow::Result<Query> {
    if source == "-" {
        return Query::load(std::io::stdin().lock(), format).context("reading query from stdin");
    }
    let path = std::path::Path::new(source);
    if path.is_file() {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        log::info!("Reading query from {}", path.display());
        return Query::load(file, format).with_context(|| format!("parsing {}", path.display()));
    }
    Query::new(source, format).context("parsing query")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Convert {
            query,
            from,
            to,
            indent,
        } => {
            let query = load_query(&query, &from)?;
            let options = indent.map_or_else(DumpOptions::compact, DumpOptions::pretty);
            let mut stdout = std::io::stdout().lock();
            query.dump(&to, &mut stdout, &options)?;
            // Pretty scripts already end with a newline
            if !matches!((to.to_ascii_lowercase().as_str(), options.indent), ("molql", Some(_))) {
                writeln!(stdout)?;
            }
        }
        Command::Syntaxes => {
            let syntaxes = global_syntaxes();
            for name in syntaxes.names() {
                let access = match syntaxes.get(&name)?.writer() {
                    Some(_) => "read/write",
                    None => "read-only",
                };
                println!("{name}\t{access}");
            }
        }
        Command::Check { query, from } => {
            let query = load_query(&query, &from)?;
            validate(query.expression(), &global_symbols())?;
            println!("ok: rooted at '{}'", query.expression().head);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn indent_help_describes_both_writers() {
        let mut cmd = Args::command();
        let convert = cmd.find_subcommand_mut("convert").unwrap();
        let indent = convert
            .get_arguments()
            .find(|arg| arg.get_id() == "indent")
            .unwrap();
        let help = indent.get_help().unwrap().to_string();
        assert!(help.contains("json"), "{help}");
        assert!(help.contains("base indent for molql"), "{help}");
    }

    #[test]
    fn convert_accepts_indent() {
        let args = Args::try_parse_from(["molql", "convert", "A", "--to", "molql", "--indent", "4"])
            .unwrap();
        assert!(matches!(args.command, Command::Convert { indent: Some(4), .. }));
    }
}
