// print-transitions: dump the transition-id table of a model.
// Origin: print-transitions.cc:27-53
//
// Usage:
//   print-transitions [--states] [--pdf-class] <MODEL>
//
// Output (stdout), one line per transition id:
//   <tid> <pdf> <phone> <hmm-state> <index> <transition-state> <prob> <self-loop> <final>
// or with --states, one line per transition state:
//   <tstate> <phone> <hmm-state> <forward-pdf> <self-loop-pdf> <non-self-loop-log-prob>

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;

use amtools_cli::transitions::{enumerate_transition_states, enumerate_transitions};

/// Print what every transition id of a model decodes to.
#[derive(Parser, Debug)]
#[command(name = "print-transitions", version, about, long_about = None)]
struct Args {
    /// Model file starting with a transition model (text or binary)
    model: PathBuf,

    /// Print transition states instead of transition ids
    #[arg(long)]
    states: bool,

    /// Append the pdf-class of each transition id
    #[arg(long, conflicts_with = "states")]
    pdf_class: bool,
}

fn main() {
    let args = Args::parse();
    amtools_cli::init_logging();

    let model = amtools_cli::load_transition_model(&args.model)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    log::info!(
        "{} phones, {} transition states, {} transition ids, {} pdfs",
        model.num_phones(),
        model.num_transition_states(),
        model.num_transition_ids(),
        model.num_pdfs()
    );

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let written = if args.states {
        enumerate_transition_states(&model, &mut out)
    } else {
        enumerate_transitions(&model, &mut out, args.pdf_class)
    };
    let lines = written.unwrap_or_else(|e| amtools_cli::fatal(&e.to_string()));
    if let Err(e) = out.flush() {
        amtools_cli::fatal(&format!("failed to write output: {e}"));
    }
    log::debug!("wrote {lines} lines");
}
