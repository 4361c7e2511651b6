// Context enumeration: every phonetic context crossed with every pdf-class,
// resolved to its pdf and printed one line per resolved tuple.
// Origin: context-to-pdf.cc:96-158
//
// Output lines:
//   triphone:  <left> <center> <right> <pdf-class> <pdf-id>
//   monophone: <phone> <pdf-class> <pdf-id>
// Phones are printed by name. Left and right contexts range over every
// symbol id including epsilon; center and monophone phones skip epsilon.

use std::io::Write;

use amtools_core::config::PdfClassConfig;
use amtools_core::symbols::SymbolTable;
use amtools_core::{EPSILON, PhoneId};
use amtools_model::{ContextResolver, Resolution};

use crate::EnumerateError;

/// Enumeration shape selected from a tree's (width, central position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Triphone,
    Monophone,
    Unsupported { width: i32, central: i32 },
}

impl ContextMode {
    pub fn select(width: i32, central: i32) -> Self {
        match (width, central) {
            (3, 1) => ContextMode::Triphone,
            (1, 0) => ContextMode::Monophone,
            _ => ContextMode::Unsupported { width, central },
        }
    }

    pub fn of<R: ContextResolver + ?Sized>(resolver: &R) -> Self {
        Self::select(resolver.context_width(), resolver.central_position())
    }
}

/// Counts reported after an enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSummary {
    /// Lines written.
    pub lines: u64,
    /// (context, pdf-class) pairs the resolver had no pdf for; not printed.
    pub unresolved: u64,
}

impl EnumerationSummary {
    fn record<W: Write>(
        &mut self,
        out: &mut W,
        resolution: Resolution,
        context: &[PhoneId],
        pdf_class: i32,
        symbols: &SymbolTable,
    ) -> Result<(), EnumerateError> {
        let Resolution::Pdf(pdf) = resolution else {
            log::debug!("no pdf for context {context:?}, pdf-class {pdf_class}");
            self.unresolved += 1;
            return Ok(());
        };
        for &phone in context {
            write!(out, "{} ", symbols.name(phone))?;
        }
        writeln!(out, "{pdf_class} {pdf}")?;
        self.lines += 1;
        Ok(())
    }
}

/// Resolve every context of `resolver`'s shape crossed with the pdf-classes
/// of its modeled phone, handing each `(context, pdf-class, resolution)` to
/// `visit` in enumeration order.
///
/// Order is left-major, then center, right and pdf-class for triphones;
/// phone-major then pdf-class for monophones, so all pdf-classes of one
/// context are visited consecutively. Any other tree shape is rejected
/// before `visit` is called.
pub fn visit_contexts<R, F>(
    symbols: &SymbolTable,
    resolver: &R,
    config: &PdfClassConfig,
    mut visit: F,
) -> Result<(), EnumerateError>
where
    R: ContextResolver + ?Sized,
    F: FnMut(&[PhoneId], i32, Resolution) -> Result<(), EnumerateError>,
{
    let num_phones = symbols.num_symbols() as PhoneId;

    match ContextMode::of(resolver) {
        ContextMode::Triphone => {
            for left in 0..num_phones {
                for center in (EPSILON + 1)..num_phones {
                    let classes = config.class_count(center);
                    for right in 0..num_phones {
                        let context = [left, center, right];
                        for pdf_class in 0..classes {
                            visit(&context, pdf_class, resolver.compute(&context, pdf_class))?;
                        }
                    }
                }
            }
        }
        ContextMode::Monophone => {
            for phone in (EPSILON + 1)..num_phones {
                let context = [phone];
                for pdf_class in 0..config.class_count(phone) {
                    visit(&context, pdf_class, resolver.compute(&context, pdf_class))?;
                }
            }
        }
        ContextMode::Unsupported { width, central } => {
            return Err(EnumerateError::UnsupportedContext { width, central });
        }
    }
    Ok(())
}

/// Enumerate all contexts of `resolver`'s shape and write one line per
/// resolved (context, pdf-class) pair.
///
/// Lines follow [`visit_contexts`] order. Pairs the resolver cannot resolve
/// are skipped without disturbing the order of the remaining lines.
pub fn enumerate_contexts<R, W>(
    symbols: &SymbolTable,
    resolver: &R,
    config: &PdfClassConfig,
    out: &mut W,
) -> Result<EnumerationSummary, EnumerateError>
where
    R: ContextResolver + ?Sized,
    W: Write,
{
    let mut summary = EnumerationSummary::default();
    visit_contexts(symbols, resolver, config, |context, pdf_class, resolution| {
        summary.record(&mut *out, resolution, context, pdf_class, symbols)
    })?;
    Ok(summary)
}
