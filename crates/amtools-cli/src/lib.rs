// amtools-cli: enumerators, HTK export and shared utilities for the CLI tools.

pub mod context;
pub mod htk;
pub mod transitions;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process;

use amtools_core::symbols::SymbolTable;
use amtools_model::context_dep::ContextDependency;
use amtools_model::transition::TransitionModel;

/// Error raised while enumerating to an output sink.
#[derive(Debug, thiserror::Error)]
pub enum EnumerateError {
    #[error(
        "unsupported context dependency: width {width}, central position {central} \
         (only triphone trees (3, 1) and monophone trees (1, 0) can be enumerated)"
    )]
    UnsupportedContext { width: i32, central: i32 },
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize logging to stderr, honoring `RUST_LOG` (default `info`).
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))
}

/// Load a phone symbol table in OpenFst text format.
pub fn load_symbols(path: &Path) -> Result<SymbolTable, String> {
    let data = read_file(path)?;
    let text = String::from_utf8(data)
        .map_err(|e| format!("phone symbol table {} is not UTF-8: {e}", path.display()))?;
    let symbols = SymbolTable::parse(&text)
        .map_err(|e| format!("could not read phone symbol table {}: {e}", path.display()))?;
    if !symbols.is_dense() {
        log::warn!(
            "phone symbol ids in {} are not contiguous; ids without a symbol print as empty names",
            path.display()
        );
    }
    Ok(symbols)
}

/// Load a context-dependency tree (text or binary).
pub fn load_context_dependency(path: &Path) -> Result<ContextDependency, String> {
    let data = read_file(path)?;
    ContextDependency::from_bytes(&data)
        .map_err(|e| format!("could not read tree {}: {e}", path.display()))
}

/// Load the transition model at the start of a model file (text or binary).
pub fn load_transition_model(path: &Path) -> Result<TransitionModel, String> {
    let data = read_file(path)?;
    TransitionModel::from_bytes(&data)
        .map_err(|e| format!("could not read transition model {}: {e}", path.display()))
}

/// Create `path` and fill it through a buffered writer.
pub fn write_file<T, F>(path: &Path, write: F) -> Result<T, String>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<T, EnumerateError>,
{
    let file = File::create(path).map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    let mut out = BufWriter::new(file);
    let value = write(&mut out).map_err(|e| format!("{}: {e}", path.display()))?;
    out.flush()
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(value)
}

/// Print an error message and exit with code 1.
pub fn fatal(msg: &str) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}
