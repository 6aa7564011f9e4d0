//! Argument parsing, file I/O, and the `--dump-lexed`/`--dump-parsed`
//! surface of spec §6. This module is the "external collaborator" layer the
//! core spec explicitly treats as out of its own budget.

use crate::bridge::{Config, Litua};
use crate::lexer::tokenize;
use crate::logger::Verbosity;
use crate::parser::parse;
use anyhow::{Context, Result};
use clap::Parser;
use ptree::{print_tree, TreeItem};
use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;

/// `litua <input>` — process a litua source file through the core pipeline.
#[derive(Parser, Debug)]
#[command(name = "litua", bin_name = "litua", about = "A bracketed-markup text-document transformer")]
pub struct Cli {
    /// Input source file.
    pub input: PathBuf,

    /// Write output here instead of `<input-basename>.out`.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print the token stream instead of running the pipeline.
    #[arg(long)]
    pub dump_lexed: bool,

    /// Print the parsed tree instead of running the pipeline.
    #[arg(long)]
    pub dump_parsed: bool,

    /// Print `LOG[...]` diagnostics at verbose level.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Suppress `LOG[...]` diagnostics entirely.
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Silent,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Default,
        }
    }

    /// `<input-basename>.out` (spec §6): the input's extension, if any, is
    /// replaced rather than appended to.
    fn default_output_path(&self) -> PathBuf {
        let mut out = self.input.clone();
        out.set_extension("out");
        out
    }
}

/// Runs the CLI end to end; returns the process exit code (spec §6 "Exit
/// code `0` on success; non-zero on any fatal diagnostic").
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    let source = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading input file '{}'", cli.input.display()))?;

    if cli.dump_lexed {
        let tokens = tokenize(&source)?;
        for token in &tokens {
            println!("{:>6}  {:?}", token.offset, token.kind);
        }
        return Ok(0);
    }

    if cli.dump_parsed {
        let tokens = tokenize(&source)?;
        let document = parse(tokens, &source)?;
        print_tree(&NodeTreeItem(document))?;
        return Ok(0);
    }

    let output_path = cli.output.clone().unwrap_or_else(|| cli.default_output_path());
    let config = Config {
        input_path: cli.input.clone(),
        output_path: Some(output_path.clone()),
        dump_lexed: cli.dump_lexed,
        dump_parsed: cli.dump_parsed,
        verbosity: cli.verbosity(),
    };

    let litua = Litua::new(config);
    let result = litua.run(source);

    if let Some(primary) = &result.outcome.primary {
        eprint!("{primary}");
    }
    for teardown_error in &result.outcome.teardown_errors {
        eprint!("{teardown_error}");
    }

    if result.outcome.is_success() {
        let mut file = std::fs::File::create(&output_path)
            .with_context(|| format!("creating output file '{}'", output_path.display()))?;
        file.write_all(result.output.as_bytes())
            .with_context(|| format!("writing output file '{}'", output_path.display()))?;
    }

    Ok(result.outcome.exit_code())
}

/// Adapts a parsed `Node` tree to [`ptree::TreeItem`] for `--dump-parsed`,
/// mirroring `lang_pt::ASTNode`'s own `TreeItem` impl.
struct NodeTreeItem(crate::node::Node);

impl TreeItem for NodeTreeItem {
    type Child = NodeTreeItem;

    fn write_self<W: Write>(&self, f: &mut W, style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", style.paint(&self.0.call))
    }

    fn children(&self) -> Cow<[Self::Child]> {
        let mut children = Vec::new();
        for child in &self.0.content {
            if let crate::node::Child::Node(n) = child {
                children.push(NodeTreeItem(n.copy()));
            }
        }
        for (_, values) in self.0.sorted_args() {
            for value in values {
                if let crate::node::ArgValue::Node(n) = value {
                    children.push(NodeTreeItem(n.copy()));
                }
            }
        }
        Cow::from(children)
    }
}
