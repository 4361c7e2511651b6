// Context dependency: maps a phonetic context window and pdf-class to a pdf.

use amtools_core::PhoneId;

use crate::event_map::{EventKey, EventMap, EventValue, PDF_CLASS_KEY};
use crate::format::KaldiReader;
use crate::{ContextResolver, ModelError, Resolution};

/// A loaded context-dependency tree.
///
/// `width` is the number of phones in a context window (3 for triphones) and
/// `central` the index of the modeled phone inside it (1 for triphones).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDependency {
    width: i32,
    central: i32,
    to_pdf: EventMap,
}

impl ContextDependency {
    /// Create a context dependency, validating `0 <= central < width`.
    pub fn new(width: i32, central: i32, to_pdf: EventMap) -> Result<Self, ModelError> {
        if width < 1 || central < 0 || central >= width {
            return Err(ModelError::InvalidStructure(format!(
                "context width {width} with central position {central}"
            )));
        }
        Ok(Self {
            width,
            central,
            to_pdf,
        })
    }

    /// Parse a tree file (text or binary).
    pub fn from_bytes(data: &[u8]) -> Result<Self, ModelError> {
        let mut reader = KaldiReader::new(data);
        Self::read(&mut reader)
    }

    /// Read `ContextDependency <N> <P> ToPdf <event-map> EndContextDependency`.
    pub fn read(reader: &mut KaldiReader<'_>) -> Result<Self, ModelError> {
        reader.expect_token("ContextDependency")?;
        let width = reader.read_i32()?;
        let central = reader.read_i32()?;
        reader.expect_token("ToPdf")?;
        let to_pdf = EventMap::read_required(reader, "ToPdf map")?;
        reader.expect_token("EndContextDependency")?;
        log::debug!("read context dependency: width {width}, central position {central}");
        Self::new(width, central, to_pdf)
    }

    /// Number of pdfs the tree can produce (largest leaf answer plus one).
    pub fn num_pdfs(&self) -> i32 {
        self.to_pdf.max_result().map_or(0, |max| max + 1)
    }
}

impl ContextResolver for ContextDependency {
    fn context_width(&self) -> i32 {
        self.width
    }

    fn central_position(&self) -> i32 {
        self.central
    }

    fn compute(&self, context: &[PhoneId], pdf_class: i32) -> Resolution {
        debug_assert_eq!(context.len(), self.width as usize);
        let mut event: Vec<(EventKey, EventValue)> = Vec::with_capacity(context.len() + 1);
        event.push((PDF_CLASS_KEY, pdf_class));
        event.extend(
            context
                .iter()
                .enumerate()
                .map(|(position, &phone)| (position as EventKey, phone)),
        );
        match self.to_pdf.map(&event) {
            Some(pdf) => Resolution::Pdf(pdf),
            None => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::BinaryWriter;

    /// Monophone tree over phones 1 and 2: phone 1 has two pdf-classes
    /// (pdfs 0, 1), phone 2 one (pdf 2).
    const MONO_TREE: &str = "ContextDependency 1 0 ToPdf TE 0 3 ( NULL TE -1 2 ( CE 0 CE 1 ) \
                             TE -1 1 ( CE 2 ) ) \nEndContextDependency ";

    #[test]
    fn read_text_monophone_tree() {
        let ctx = ContextDependency::from_bytes(MONO_TREE.as_bytes()).unwrap();
        assert_eq!(ctx.context_width(), 1);
        assert_eq!(ctx.central_position(), 0);
        assert_eq!(ctx.num_pdfs(), 3);
        assert_eq!(ctx.compute(&[1], 0), Resolution::Pdf(0));
        assert_eq!(ctx.compute(&[1], 1), Resolution::Pdf(1));
        assert_eq!(ctx.compute(&[2], 0), Resolution::Pdf(2));
        assert_eq!(ctx.compute(&[2], 1), Resolution::NotFound);
        assert_eq!(ctx.compute(&[0], 0), Resolution::NotFound);
    }

    #[test]
    fn read_binary_triphone_tree() {
        let mut w = BinaryWriter::new();
        w.token("ContextDependency").i32(3).i32(1).token("ToPdf");
        // Right context 0 (word boundary) gets its own pdf.
        w.token("SE").i32(2).i32_vec(&[0]).token("{");
        w.token("CE").i32(4);
        w.token("TE").i32(-1).u32(2).token("(");
        w.token("CE").i32(5).token("CE").i32(6);
        w.token(")").token("}");
        w.token("EndContextDependency");
        let ctx = ContextDependency::from_bytes(&w.buf).unwrap();
        assert_eq!(ctx.context_width(), 3);
        assert_eq!(ctx.central_position(), 1);
        assert_eq!(ctx.num_pdfs(), 7);
        assert_eq!(ctx.compute(&[1, 2, 0], 0), Resolution::Pdf(4));
        assert_eq!(ctx.compute(&[1, 2, 3], 1), Resolution::Pdf(6));
        assert_eq!(ctx.compute(&[1, 2, 3], 2), Resolution::NotFound);
    }

    #[test]
    fn compute_is_deterministic() {
        let ctx = ContextDependency::from_bytes(MONO_TREE.as_bytes()).unwrap();
        for _ in 0..3 {
            assert_eq!(ctx.compute(&[1], 1), Resolution::Pdf(1));
        }
    }

    #[test]
    fn reject_invalid_shape() {
        assert!(ContextDependency::new(3, 3, EventMap::Constant(0)).is_err());
        assert!(ContextDependency::new(0, 0, EventMap::Constant(0)).is_err());
        assert!(ContextDependency::new(2, -1, EventMap::Constant(0)).is_err());
        assert!(ContextDependency::new(2, 1, EventMap::Constant(0)).is_ok());
    }

    #[test]
    fn reject_missing_end_token() {
        let text = "ContextDependency 1 0 ToPdf CE 0 ";
        assert!(matches!(
            ContextDependency::from_bytes(text.as_bytes()).unwrap_err(),
            ModelError::Truncated { .. }
        ));
    }

    #[test]
    fn reject_null_root() {
        let text = "ContextDependency 1 0 ToPdf NULL EndContextDependency ";
        assert!(matches!(
            ContextDependency::from_bytes(text.as_bytes()).unwrap_err(),
            ModelError::InvalidStructure(_)
        ));
    }

    #[test]
    fn reject_transition_model_file() {
        let err = ContextDependency::from_bytes(b"<TransitionModel> <Topology>").unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedToken { .. }));
    }
}
