// context-to-pdf: list the pdf each phonetic context resolves to.
// Origin: context-to-pdf.cc:24-95
//
// Enumerates every triphone (or monophone) context over the phone symbol
// table, crossed with the pdf-classes of its center phone, and prints the
// pdf the decision tree assigns to it.
//
// Usage:
//   context-to-pdf [OPTIONS] <PHONE_SYMBOLS> <TREE>
//
// Output (stdout), one line per resolved context:
//   triphone:  <left> <center> <right> <pdf-class> <pdf-id>
//   monophone: <phone> <pdf-class> <pdf-id>

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;

use amtools_cli::context::enumerate_contexts;
use amtools_core::config::{
    DEFAULT_NON_SIL_PDF_CLASSES, DEFAULT_SIL_PDF_CLASSES, DEFAULT_SIL_PHONES, PdfClassConfig,
    parse_phone_list,
};
use amtools_model::ContextResolver;

/// Print the pdf id of every phonetic context and pdf-class.
#[derive(Parser, Debug)]
#[command(name = "context-to-pdf", version, about, long_about = None)]
struct Args {
    /// Phone symbol table (`name id` per line)
    phone_symbols: PathBuf,

    /// Context-dependency tree file (text or binary)
    tree: PathBuf,

    /// Comma-separated silence phone ids; empty for none
    #[arg(long, default_value = DEFAULT_SIL_PHONES)]
    sil_phones: String,

    /// Number of pdf-classes of a silence phone
    #[arg(long, default_value_t = DEFAULT_SIL_PDF_CLASSES,
          value_parser = clap::value_parser!(i32).range(0..))]
    sil_pdf_classes: i32,

    /// Number of pdf-classes of any other phone
    #[arg(long, default_value_t = DEFAULT_NON_SIL_PDF_CLASSES,
          value_parser = clap::value_parser!(i32).range(0..))]
    non_sil_pdf_classes: i32,
}

fn main() {
    let args = Args::parse();
    amtools_cli::init_logging();

    let silence = parse_phone_list(&args.sil_phones)
        .unwrap_or_else(|e| amtools_cli::fatal(&e.to_string()));
    if silence.is_empty() {
        log::info!("no silence phones");
    } else {
        log::info!("silence phones: {:?}", silence.sorted());
    }
    let config = PdfClassConfig::new(silence, args.sil_pdf_classes, args.non_sil_pdf_classes);

    let symbols = amtools_cli::load_symbols(&args.phone_symbols)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    let tree = amtools_cli::load_context_dependency(&args.tree)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    log::info!(
        "context width {}, central position {}, {} pdfs, {} phone symbols",
        tree.context_width(),
        tree.central_position(),
        tree.num_pdfs(),
        symbols.num_symbols()
    );

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let summary = enumerate_contexts(&symbols, &tree, &config, &mut out)
        .unwrap_or_else(|e| amtools_cli::fatal(&e.to_string()));
    if let Err(e) = out.flush() {
        amtools_cli::fatal(&format!("failed to write output: {e}"));
    }

    log::info!(
        "wrote {} lines, {} contexts without a pdf",
        summary.lines,
        summary.unresolved
    );
}
