// HTK export: regroup resolved contexts into HMMs and write them as an HTK
// master macro file (MMF) plus a tied list.
// Origin: kaldi2HTK.py:130-330
//
// Each context whose pdf-classes resolve becomes an HMM whose emitting states
// are the resolved pdfs in pdf-class order. Contexts sharing a pdf sequence
// share one physical HMM named after the first of them; the tied list maps
// the others onto it. Output distributions are placeholders: one zero-mean,
// unit-variance Gaussian per pdf.
//
// MMF layout:
//   ~o header
//   ~t "T_<pdf>_<pdf>..."   one transition matrix per physical HMM
//   ~s "state_<pdf>"        one placeholder state per pdf, ascending
//   ~h "<name>"             one HMM definition per physical HMM

use std::fmt;
use std::io::Write;

use hashbrown::{HashMap, HashSet};

use amtools_core::config::PdfClassConfig;
use amtools_core::symbols::SymbolTable;
use amtools_core::{EPSILON, PhoneId};
use amtools_model::transition::TransitionModel;
use amtools_model::{ContextResolver, Resolution};

use crate::EnumerateError;
use crate::context::visit_contexts;

/// Feature vector size written when none is given.
pub const DEFAULT_VEC_SIZE: usize = 39;

/// HTK silence models conventionally have three emitting states.
pub const DEFAULT_SIL_PDF_CLASSES: i32 = 3;

/// Formats a float the way C's `%.6e` does: `7.500000e-01`.
#[derive(Debug, Clone, Copy)]
pub struct Scientific(pub f64);

impl fmt::Display for Scientific {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if x.is_nan() {
            return f.write_str("nan");
        }
        if x.is_infinite() {
            return f.write_str(if x < 0.0 { "-inf" } else { "inf" });
        }
        // Rust writes `7.500000e-1`; C pads the exponent to two digits and signs it.
        let sci = format!("{x:.6e}");
        let Some((mantissa, exp)) = sci.split_once('e') else {
            return f.write_str(&sci);
        };
        let exp: i32 = exp.parse().map_err(|_| fmt::Error)?;
        let sign = if exp < 0 { '-' } else { '+' };
        write!(f, "{mantissa}e{sign}{:02}", exp.abs())
    }
}

// ---------------------------------------------------------------------------
// Transition probabilities
// ---------------------------------------------------------------------------

/// Transition probabilities keyed by (pdf, HMM state, transition index).
///
/// When several transition states share a pdf, the one with the highest
/// transition ids wins.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    probs: HashMap<(i32, i32, i32), f32>,
}

impl TransitionTable {
    pub fn from_model(model: &TransitionModel) -> Self {
        let mut probs = HashMap::with_capacity(model.num_transition_ids() as usize);
        for tid in model.transition_ids() {
            let info = model.decompose(tid);
            probs.insert((info.pdf, info.hmm_state, info.transition_index), info.prob);
        }
        Self { probs }
    }

    #[inline]
    pub fn get(&self, pdf: i32, hmm_state: i32, transition_index: i32) -> Option<f32> {
        self.probs.get(&(pdf, hmm_state, transition_index)).copied()
    }
}

/// Phones whose topology has a different number of pdf-classes than the
/// enumeration will try, as `(phone, topology classes, configured classes)`.
pub fn class_count_mismatches(
    model: &TransitionModel,
    config: &PdfClassConfig,
) -> Vec<(PhoneId, i32, i32)> {
    let topo = model.topology();
    topo.phones()
        .iter()
        .filter_map(|&phone| {
            let classes = topo.num_pdf_classes(phone)?;
            let configured = config.class_count(phone);
            (classes != configured).then_some((phone, classes, configured))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HMM set
// ---------------------------------------------------------------------------

/// HTK name of a context: `l-c+r` for triphones, the phone for monophones.
pub fn htk_name(symbols: &SymbolTable, context: &[PhoneId]) -> String {
    match context {
        [left, center, right] => format!(
            "{}-{}+{}",
            symbols.name(*left),
            symbols.name(*center),
            symbols.name(*right)
        ),
        _ => context
            .iter()
            .map(|&phone| symbols.name(phone))
            .collect::<Vec<_>>()
            .join("-"),
    }
}

/// Whether a context gets an HMM. Disambiguation symbols (`#...`) never do,
/// nor do contexts touching epsilon.
fn is_modeled(symbols: &SymbolTable, context: &[PhoneId]) -> bool {
    context
        .iter()
        .all(|&phone| phone != EPSILON && !symbols.name(phone).contains('#'))
}

/// One physical HMM and the logical contexts tied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtkHmm {
    /// Pdf of each emitting state.
    pub pdfs: Vec<i32>,
    /// HTK names of the contexts using this HMM, in enumeration order.
    pub contexts: Vec<String>,
}

impl HtkHmm {
    /// Physical name: the first context.
    pub fn name(&self) -> &str {
        self.contexts.first().map_or("", String::as_str)
    }

    /// Name of the transition matrix macro, `T_<pdf>_<pdf>...`.
    pub fn transition_name(&self) -> String {
        let pdfs: Vec<String> = self.pdfs.iter().map(i32::to_string).collect();
        format!("T_{}", pdfs.join("_"))
    }

    /// Transition matrix over the entry state, the emitting states and the
    /// exit state. Emitting state `i` takes its self-loop and forward arcs
    /// from `(pdf, i, 0)` and `(pdf, i, 1)`.
    ///
    /// Returns the matrix and the number of arcs `transitions` had no
    /// probability for; those stay 0.
    pub fn transition_matrix(&self, transitions: &TransitionTable) -> (Vec<Vec<f32>>, u64) {
        let size = self.pdfs.len() + 2;
        let mut matrix = vec![vec![0.0; size]; size];
        matrix[0][1] = 1.0;
        let mut missing = 0;
        for (state, &pdf) in self.pdfs.iter().enumerate() {
            for index in 0..2 {
                match transitions.get(pdf, state as i32, index as i32) {
                    Some(prob) => matrix[state + 1][state + 1 + index] = prob,
                    None => {
                        log::warn!(
                            "HMM {}: no transition for pdf {pdf} at state {state}, index {index}",
                            self.name()
                        );
                        missing += 1;
                    }
                }
            }
        }
        (matrix, missing)
    }
}

/// Physical HMMs in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HmmSet {
    hmms: Vec<HtkHmm>,
}

struct HmmSetBuilder<'a> {
    symbols: &'a SymbolTable,
    hmms: Vec<HtkHmm>,
    by_pdfs: HashMap<Vec<i32>, usize>,
    /// Context being collected and its pdfs so far.
    current: Option<(Vec<PhoneId>, Vec<i32>)>,
}

impl<'a> HmmSetBuilder<'a> {
    fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            hmms: Vec::new(),
            by_pdfs: HashMap::new(),
            current: None,
        }
    }

    fn push(&mut self, context: &[PhoneId], pdf: i32) {
        if let Some((current, pdfs)) = &mut self.current {
            if current.as_slice() == context {
                pdfs.push(pdf);
                return;
            }
        }
        self.flush();
        self.current = Some((context.to_vec(), vec![pdf]));
    }

    fn flush(&mut self) {
        let Some((context, pdfs)) = self.current.take() else {
            return;
        };
        let name = htk_name(self.symbols, &context);
        match self.by_pdfs.get(&pdfs) {
            Some(&index) => self.hmms[index].contexts.push(name),
            None => {
                self.by_pdfs.insert(pdfs.clone(), self.hmms.len());
                self.hmms.push(HtkHmm {
                    pdfs,
                    contexts: vec![name],
                });
            }
        }
    }

    fn finish(mut self) -> HmmSet {
        self.flush();
        HmmSet { hmms: self.hmms }
    }
}

impl HmmSet {
    /// Enumerate every context of `resolver` and group the resolved pdfs
    /// into HMMs.
    pub fn collect<R>(
        symbols: &SymbolTable,
        resolver: &R,
        config: &PdfClassConfig,
    ) -> Result<Self, EnumerateError>
    where
        R: ContextResolver + ?Sized,
    {
        let mut builder = HmmSetBuilder::new(symbols);
        visit_contexts(symbols, resolver, config, |context, _, resolution| {
            if let Resolution::Pdf(pdf) = resolution {
                if is_modeled(symbols, context) {
                    builder.push(context, pdf);
                }
            }
            Ok(())
        })?;
        Ok(builder.finish())
    }

    pub fn hmms(&self) -> &[HtkHmm] {
        &self.hmms
    }

    /// Every pdf used by some HMM, ascending.
    pub fn pdfs(&self) -> Vec<i32> {
        let mut pdfs: Vec<i32> = self
            .hmms
            .iter()
            .flat_map(|hmm| hmm.pdfs.iter().copied())
            .collect();
        pdfs.sort_unstable();
        pdfs.dedup();
        pdfs
    }

    /// Write the MMF.
    ///
    /// Returns the number of transition arcs missing from `transitions`.
    pub fn write_mmf<W: Write>(
        &self,
        transitions: &TransitionTable,
        vec_size: usize,
        out: &mut W,
    ) -> Result<u64, EnumerateError> {
        writeln!(out, "~o")?;
        writeln!(out, "<STREAMINFO> 1 {vec_size}")?;
        writeln!(out, "<VECSIZE> {vec_size}<NULLD><USER><DIAGC>")?;

        let mut missing = 0;
        for hmm in &self.hmms {
            let (matrix, absent) = hmm.transition_matrix(transitions);
            missing += absent;
            writeln!(out, "~t \"{}\"", hmm.transition_name())?;
            writeln!(out, "<TRANSP> {}", matrix.len())?;
            for row in &matrix {
                write_row(out, row.iter().map(|&p| f64::from(p)))?;
            }
        }

        for pdf in self.pdfs() {
            writeln!(out, "~s \"state_{pdf}\"")?;
            writeln!(out, "<NUMMIXES> 1")?;
            writeln!(out, "<MIXTURE> 1 {}", Scientific(1.0))?;
            writeln!(out, "<MEAN> {vec_size}")?;
            write_row(out, std::iter::repeat_n(0.0, vec_size))?;
            writeln!(out, "<VARIANCE> {vec_size}")?;
            write_row(out, std::iter::repeat_n(1.0, vec_size))?;
            writeln!(out, "<GCONST> {}", Scientific(1.0))?;
        }

        for hmm in &self.hmms {
            writeln!(out, "~h \"{}\"", hmm.name())?;
            writeln!(out, "<BEGINHMM>")?;
            writeln!(out, "<NUMSTATES> {}", hmm.pdfs.len() + 2)?;
            for (state, pdf) in hmm.pdfs.iter().enumerate() {
                writeln!(out, "<STATE> {}", state + 2)?;
                writeln!(out, "~s \"state_{pdf}\"")?;
            }
            writeln!(out, "~t \"{}\"", hmm.transition_name())?;
            writeln!(out, "<ENDHMM>")?;
        }
        Ok(missing)
    }

    /// Write the tied list: each physical HMM name, then one
    /// `<logical> <physical>` line per further context tied to it.
    ///
    /// Returns the number of lines written.
    pub fn write_tiedlist<W: Write>(&self, out: &mut W) -> Result<u64, EnumerateError> {
        let mut written: HashSet<(&str, &str)> = HashSet::new();
        let mut lines = 0;
        for hmm in &self.hmms {
            let physical = hmm.name();
            writeln!(out, "{physical}")?;
            lines += 1;
            for logical in hmm.contexts.iter().skip(1).map(String::as_str) {
                if logical != physical && written.insert((logical, physical)) {
                    writeln!(out, "{logical} {physical}")?;
                    lines += 1;
                }
            }
        }
        Ok(lines)
    }
}

fn write_row<W: Write>(
    out: &mut W,
    values: impl IntoIterator<Item = f64>,
) -> Result<(), EnumerateError> {
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{}", Scientific(value))?;
    }
    writeln!(out)?;
    Ok(())
}
