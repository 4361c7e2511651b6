// kaldi-to-htk: export a Kaldi model's HMM structure as HTK models.
// Origin: kaldi2HTK.py:210-367
//
// Resolves every context of the tree to its pdf sequence, ties contexts with
// equal sequences to one physical HMM, and writes the HMMs with transition
// matrices taken from the model and placeholder output distributions.
//
// Usage:
//   kaldi-to-htk [OPTIONS] <MODEL> <PHONE_SYMBOLS> <TREE> <HTK_MODEL> <TIEDLIST>

use std::path::PathBuf;

use clap::Parser;

use amtools_cli::htk::{
    DEFAULT_SIL_PDF_CLASSES, DEFAULT_VEC_SIZE, HmmSet, TransitionTable, class_count_mismatches,
};
use amtools_core::config::{
    DEFAULT_NON_SIL_PDF_CLASSES, DEFAULT_SIL_PHONES, PdfClassConfig, parse_phone_list,
};

/// Convert a Kaldi transition model and tree to an HTK MMF and tied list.
#[derive(Parser, Debug)]
#[command(name = "kaldi-to-htk", version, about, long_about = None)]
struct Args {
    /// Model file starting with a transition model (text or binary)
    model: PathBuf,

    /// Phone symbol table (`name id` per line)
    phone_symbols: PathBuf,

    /// Context-dependency tree file (text or binary)
    tree: PathBuf,

    /// Output HTK master macro file
    htk_model: PathBuf,

    /// Output HTK tied list
    tiedlist: PathBuf,

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

    /// Feature vector size of the placeholder Gaussians
    #[arg(long, default_value_t = DEFAULT_VEC_SIZE)]
    vec_size: usize,
}

fn main() {
    let args = Args::parse();
    amtools_cli::init_logging();

    let silence = parse_phone_list(&args.sil_phones)
        .unwrap_or_else(|e| amtools_cli::fatal(&e.to_string()));
    let config = PdfClassConfig::new(silence, args.sil_pdf_classes, args.non_sil_pdf_classes);

    let model = amtools_cli::load_transition_model(&args.model)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    let symbols = amtools_cli::load_symbols(&args.phone_symbols)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    let tree = amtools_cli::load_context_dependency(&args.tree)
        .unwrap_or_else(|e| amtools_cli::fatal(&e));

    for (phone, classes, configured) in class_count_mismatches(&model, &config) {
        log::warn!(
            "phone {phone} has {classes} pdf-classes in the topology, {configured} enumerated"
        );
    }

    let transitions = TransitionTable::from_model(&model);
    let hmms = HmmSet::collect(&symbols, &tree, &config)
        .unwrap_or_else(|e| amtools_cli::fatal(&e.to_string()));
    log::info!(
        "{} physical HMMs over {} pdfs",
        hmms.hmms().len(),
        hmms.pdfs().len()
    );

    let missing = amtools_cli::write_file(&args.htk_model, |out| {
        hmms.write_mmf(&transitions, args.vec_size, out)
    })
    .unwrap_or_else(|e| amtools_cli::fatal(&e));
    if missing > 0 {
        log::warn!("{missing} transition probabilities not found in the model; left at 0");
    }

    let lines = amtools_cli::write_file(&args.tiedlist, |out| hmms.write_tiedlist(out))
        .unwrap_or_else(|e| amtools_cli::fatal(&e));
    log::debug!("wrote {lines} tied list lines");
}
