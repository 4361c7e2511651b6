// HMM topology: the state graph shared by groups of phones.
//
// Each topology entry lists its HMM states in order. A state carries a
// forward pdf-class, a self-loop pdf-class and its outgoing transitions; the
// last state of an entry is the non-emitting final state.

use amtools_core::PhoneId;

use crate::ModelError;
use crate::format::KaldiReader;

/// Pdf-class of a non-emitting state.
pub const NO_PDF: i32 = -1;

/// Largest phone id a topology may cover; the phone index is dense up to it.
pub const MAX_PHONE: PhoneId = 1 << 20;

/// One HMM state of a topology entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HmmState {
    pub forward_pdf_class: i32,
    pub self_loop_pdf_class: i32,
    /// Outgoing transitions as `(destination state, probability)`.
    pub transitions: Vec<(i32, f32)>,
}

impl HmmState {
    /// An emitting state whose forward and self-loop pdf-classes coincide.
    pub fn emitting(pdf_class: i32, transitions: Vec<(i32, f32)>) -> Self {
        Self {
            forward_pdf_class: pdf_class,
            self_loop_pdf_class: pdf_class,
            transitions,
        }
    }

    /// The non-emitting final state.
    pub fn final_state() -> Self {
        Self {
            forward_pdf_class: NO_PDF,
            self_loop_pdf_class: NO_PDF,
            transitions: Vec::new(),
        }
    }
}

/// The HMM states of one topology entry, final state last.
pub type TopologyEntry = Vec<HmmState>;

/// Topologies for all phones of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct HmmTopology {
    /// Sorted list of phones covered by some entry.
    phones: Vec<PhoneId>,
    /// Entry index per phone, -1 for uncovered phones.
    phone2idx: Vec<i32>,
    entries: Vec<TopologyEntry>,
}

impl HmmTopology {
    /// Build a topology from `(phones, entry)` groups.
    pub fn new(groups: Vec<(Vec<PhoneId>, TopologyEntry)>) -> Result<Self, ModelError> {
        let mut phone2idx: Vec<i32> = Vec::new();
        let mut entries = Vec::with_capacity(groups.len());
        for (index, (phones, entry)) in groups.into_iter().enumerate() {
            for phone in phones {
                if !(1..=MAX_PHONE).contains(&phone) {
                    return Err(ModelError::InvalidStructure(format!("topology phone {phone}")));
                }
                let slot = phone as usize;
                if slot >= phone2idx.len() {
                    phone2idx.resize(slot + 1, -1);
                }
                if phone2idx[slot] != -1 {
                    return Err(ModelError::InvalidStructure(format!(
                        "phone {phone} appears in more than one topology entry"
                    )));
                }
                phone2idx[slot] = index as i32;
            }
            entries.push(entry);
        }
        Self::from_parts(phone2idx, entries)
    }

    fn from_parts(phone2idx: Vec<i32>, entries: Vec<TopologyEntry>) -> Result<Self, ModelError> {
        let phones = phone2idx
            .iter()
            .enumerate()
            .filter(|&(_, &idx)| idx != -1)
            .map(|(phone, _)| phone as PhoneId)
            .collect();
        let topo = Self {
            phones,
            phone2idx,
            entries,
        };
        topo.check()?;
        Ok(topo)
    }

    /// Read `<Topology> ... </Topology>` in text or binary form.
    pub fn read(reader: &mut KaldiReader<'_>) -> Result<Self, ModelError> {
        reader.expect_token("<Topology>")?;
        if !reader.is_binary() {
            return Self::read_text_body(reader);
        }
        let topo = Self::read_binary_body(reader)?;
        reader.expect_token("</Topology>")?;
        Ok(topo)
    }

    /// Read text entries up to and including `</Topology>`.
    fn read_text_body(reader: &mut KaldiReader<'_>) -> Result<Self, ModelError> {
        let mut groups = Vec::new();
        loop {
            let token = reader.read_token()?;
            if token == "</Topology>" {
                break;
            }
            if token != "<TopologyEntry>" {
                return Err(ModelError::UnexpectedToken {
                    expected: "<TopologyEntry>".to_string(),
                    found: token.to_string(),
                });
            }
            reader.expect_token("<ForPhones>")?;
            let mut phones = Vec::new();
            loop {
                let token = reader.read_token()?;
                if token == "</ForPhones>" {
                    break;
                }
                phones.push(
                    token
                        .parse::<PhoneId>()
                        .map_err(|_| ModelError::InvalidNumber(token.to_string()))?,
                );
            }

            let mut entry = TopologyEntry::new();
            loop {
                let token = reader.read_token()?;
                if token == "</TopologyEntry>" {
                    break;
                }
                if token != "<State>" {
                    return Err(ModelError::UnexpectedToken {
                        expected: "<State>".to_string(),
                        found: token.to_string(),
                    });
                }
                let index = reader.read_i32()?;
                if index != entry.len() as i32 {
                    return Err(ModelError::InvalidStructure(format!(
                        "topology state {index} listed out of order"
                    )));
                }
                entry.push(Self::read_text_state(reader)?);
            }
            groups.push((phones, entry));
        }
        Self::new(groups)
    }

    /// Read the body of one `<State>` up to and including `</State>`.
    fn read_text_state(reader: &mut KaldiReader<'_>) -> Result<HmmState, ModelError> {
        let mut state = HmmState::final_state();
        let mut token = reader.read_token()?;
        match token {
            "<PdfClass>" => {
                let pdf_class = reader.read_i32()?;
                state.forward_pdf_class = pdf_class;
                state.self_loop_pdf_class = pdf_class;
                token = reader.read_token()?;
            }
            "<ForwardPdfClass>" => {
                state.forward_pdf_class = reader.read_i32()?;
                reader.expect_token("<SelfLoopPdfClass>")?;
                state.self_loop_pdf_class = reader.read_i32()?;
                token = reader.read_token()?;
            }
            _ => {}
        }
        while token == "<Transition>" {
            let dest = reader.read_i32()?;
            let prob = reader.read_f32()?;
            state.transitions.push((dest, prob));
            token = reader.read_token()?;
        }
        if token != "</State>" {
            return Err(ModelError::UnexpectedToken {
                expected: "</State>".to_string(),
                found: token.to_string(),
            });
        }
        Ok(state)
    }

    fn read_binary_body(reader: &mut KaldiReader<'_>) -> Result<Self, ModelError> {
        let phones = reader.read_i32_vec()?;
        let phone2idx = reader.read_i32_vec()?;
        let mut num_entries = reader.read_i32()?;
        // -1 announces the extended format with separate self-loop pdf-classes.
        let separate_self_loop = num_entries == -1;
        if separate_self_loop {
            num_entries = reader.read_i32()?;
        }

        let mut entries = Vec::with_capacity(num_entries.clamp(0, 1 << 10) as usize);
        for _ in 0..num_entries {
            let num_states = reader.read_i32()?;
            let mut entry = TopologyEntry::with_capacity(num_states.clamp(0, 1 << 10) as usize);
            for _ in 0..num_states {
                let forward_pdf_class = reader.read_i32()?;
                let self_loop_pdf_class = if separate_self_loop {
                    reader.read_i32()?
                } else {
                    forward_pdf_class
                };
                let num_transitions = reader.read_i32()?;
                let mut transitions =
                    Vec::with_capacity(num_transitions.clamp(0, 1 << 10) as usize);
                for _ in 0..num_transitions {
                    let dest = reader.read_i32()?;
                    let prob = reader.read_f32()?;
                    transitions.push((dest, prob));
                }
                entry.push(HmmState {
                    forward_pdf_class,
                    self_loop_pdf_class,
                    transitions,
                });
            }
            entries.push(entry);
        }

        let topo = Self::from_parts(phone2idx, entries)?;
        if topo.phones != phones {
            return Err(ModelError::InvalidStructure(
                "topology phone list disagrees with its phone index".to_string(),
            ));
        }
        Ok(topo)
    }

    /// Validate entry shapes and phone coverage.
    pub fn check(&self) -> Result<(), ModelError> {
        for (&idx, phone) in self.phone2idx.iter().zip(0..) {
            if (phone == 0 && idx != -1) || idx < -1 || idx >= self.entries.len() as i32 {
                return Err(ModelError::InvalidStructure(format!(
                    "phone {phone} has invalid topology entry index {idx}"
                )));
            }
        }
        for (e, entry) in self.entries.iter().enumerate() {
            let Some((last, emitting)) = entry.split_last() else {
                return Err(ModelError::InvalidStructure(format!("topology entry {e} is empty")));
            };
            if last.forward_pdf_class != NO_PDF || !last.transitions.is_empty() {
                return Err(ModelError::InvalidStructure(format!(
                    "last state of topology entry {e} must be non-emitting with no transitions"
                )));
            }
            for (s, state) in emitting.iter().enumerate() {
                if state.forward_pdf_class == NO_PDF {
                    return Err(ModelError::InvalidStructure(format!(
                        "state {s} of topology entry {e} has no pdf-class"
                    )));
                }
                for &(dest, _) in &state.transitions {
                    if dest < 0 || dest as usize >= entry.len() {
                        return Err(ModelError::InvalidStructure(format!(
                            "state {s} of topology entry {e} has transition to missing state {dest}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Sorted phones covered by this topology.
    pub fn phones(&self) -> &[PhoneId] {
        &self.phones
    }

    /// All topology entries.
    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    /// Index into [`entries`](Self::entries) of `phone`'s entry.
    pub fn entry_index(&self, phone: PhoneId) -> Option<usize> {
        let idx = *self.phone2idx.get(usize::try_from(phone).ok()?)?;
        usize::try_from(idx).ok()
    }

    /// The topology entry for `phone`, if the phone is covered.
    pub fn topology_for_phone(&self, phone: PhoneId) -> Option<&TopologyEntry> {
        self.entries.get(self.entry_index(phone)?)
    }

    /// Number of distinct pdf-classes used by `phone`'s HMM.
    pub fn num_pdf_classes(&self, phone: PhoneId) -> Option<i32> {
        let entry = self.topology_for_phone(phone)?;
        let max = entry
            .iter()
            .flat_map(|s| [s.forward_pdf_class, s.self_loop_pdf_class])
            .max()
            .unwrap_or(NO_PDF);
        Some(max + 1)
    }

    /// Whether every state uses one pdf-class for both forward and self-loop arcs.
    pub fn is_hmm(&self) -> bool {
        self.entries
            .iter()
            .flatten()
            .all(|s| s.forward_pdf_class == s.self_loop_pdf_class)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::tests::BinaryWriter;

    /// Three-state left-to-right entry plus final state.
    pub(crate) fn three_state() -> TopologyEntry {
        vec![
            HmmState::emitting(0, vec![(0, 0.75), (1, 0.25)]),
            HmmState::emitting(1, vec![(1, 0.75), (2, 0.25)]),
            HmmState::emitting(2, vec![(2, 0.75), (3, 0.25)]),
            HmmState::final_state(),
        ]
    }

    /// One-state entry: self-loop plus exit.
    pub(crate) fn one_state() -> TopologyEntry {
        vec![
            HmmState::emitting(0, vec![(0, 0.5), (1, 0.5)]),
            HmmState::final_state(),
        ]
    }

    pub(crate) const TEXT_TOPOLOGY: &str = "<Topology>
<TopologyEntry>
<ForPhones>
2 3
</ForPhones>
<State> 0 <PdfClass> 0 <Transition> 0 0.75 <Transition> 1 0.25 </State>
<State> 1 <PdfClass> 1 <Transition> 1 0.75 <Transition> 2 0.25 </State>
<State> 2 <PdfClass> 2 <Transition> 2 0.75 <Transition> 3 0.25 </State>
<State> 3 </State>
</TopologyEntry>
<TopologyEntry>
<ForPhones>
1
</ForPhones>
<State> 0 <PdfClass> 0 <Transition> 0 0.5 <Transition> 1 0.5 </State>
<State> 1 </State>
</TopologyEntry>
</Topology>
";

    pub(crate) fn sample_topology() -> HmmTopology {
        HmmTopology::new(vec![(vec![2, 3], three_state()), (vec![1], one_state())]).unwrap()
    }

    pub(crate) fn write_binary(w: &mut BinaryWriter) {
        w.token("<Topology>");
        w.i32_vec(&[1, 2, 3]);
        w.i32_vec(&[-1, 1, 0, 0]);
        w.i32(2);
        for entry in [three_state(), one_state()] {
            w.i32(entry.len() as i32);
            for state in &entry {
                w.i32(state.forward_pdf_class);
                w.i32(state.transitions.len() as i32);
                for &(dest, prob) in &state.transitions {
                    w.i32(dest).f32(prob);
                }
            }
        }
        w.token("</Topology>");
    }

    #[test]
    fn read_text_topology() {
        let mut reader = KaldiReader::new(TEXT_TOPOLOGY.as_bytes());
        let topo = HmmTopology::read(&mut reader).unwrap();
        assert_eq!(topo, sample_topology());
        assert_eq!(topo.phones(), &[1, 2, 3]);
        assert!(topo.is_hmm());
    }

    #[test]
    fn read_binary_topology() {
        let mut w = BinaryWriter::new();
        write_binary(&mut w);
        let mut reader = KaldiReader::new(&w.buf);
        let topo = HmmTopology::read(&mut reader).unwrap();
        assert_eq!(topo, sample_topology());
        assert_eq!(reader.position(), w.buf.len());
    }

    #[test]
    fn read_binary_separate_self_loop_classes() {
        let mut w = BinaryWriter::new();
        w.token("<Topology>");
        w.i32_vec(&[1]);
        w.i32_vec(&[-1, 0]);
        w.i32(-1).i32(1);
        w.i32(2);
        w.i32(0).i32(1).i32(2);
        w.i32(0).f32(0.5).i32(1).f32(0.5);
        w.i32(NO_PDF).i32(NO_PDF).i32(0);
        w.token("</Topology>");

        let mut reader = KaldiReader::new(&w.buf);
        let topo = HmmTopology::read(&mut reader).unwrap();
        assert_eq!(reader.position(), w.buf.len());
        let entry = topo.topology_for_phone(1).unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry[0].forward_pdf_class, 0);
        assert_eq!(entry[0].self_loop_pdf_class, 1);
        assert_eq!(entry[0].transitions, vec![(0, 0.5), (1, 0.5)]);
        assert_eq!(entry[1], HmmState::final_state());
        assert!(!topo.is_hmm());
    }

    #[test]
    fn reject_huge_phone_id() {
        let text = "<Topology> <TopologyEntry> <ForPhones> 2000000000 </ForPhones>
<State> 0 <PdfClass> 0 <Transition> 0 0.5 <Transition> 1 0.5 </State>
<State> 1 </State> </TopologyEntry> </Topology>";
        let err = HmmTopology::read(&mut KaldiReader::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, ModelError::InvalidStructure(_)));
        assert!(HmmTopology::new(vec![(vec![MAX_PHONE], one_state())]).is_ok());
        assert!(HmmTopology::new(vec![(vec![MAX_PHONE + 1], one_state())]).is_err());
    }

    #[test]
    fn read_separate_self_loop_classes() {
        let text = "<Topology> <TopologyEntry> <ForPhones> 1 </ForPhones>
<State> 0 <ForwardPdfClass> 0 <SelfLoopPdfClass> 1 <Transition> 0 0.5 <Transition> 1 0.5 </State>
<State> 1 </State> </TopologyEntry> </Topology>";
        let topo = HmmTopology::read(&mut KaldiReader::new(text.as_bytes())).unwrap();
        let entry = topo.topology_for_phone(1).unwrap();
        assert_eq!(entry[0].forward_pdf_class, 0);
        assert_eq!(entry[0].self_loop_pdf_class, 1);
        assert!(!topo.is_hmm());
        assert_eq!(topo.num_pdf_classes(1), Some(2));
    }

    #[test]
    fn phone_lookup() {
        let topo = sample_topology();
        assert_eq!(topo.topology_for_phone(1).unwrap().len(), 2);
        assert_eq!(topo.topology_for_phone(3).unwrap().len(), 4);
        assert!(topo.topology_for_phone(0).is_none());
        assert!(topo.topology_for_phone(4).is_none());
        assert!(topo.topology_for_phone(-1).is_none());
        assert_eq!(topo.num_pdf_classes(2), Some(3));
        assert_eq!(topo.num_pdf_classes(9), None);
    }

    #[test]
    fn reject_phone_in_two_entries() {
        let err =
            HmmTopology::new(vec![(vec![1], one_state()), (vec![1], three_state())]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidStructure(_)));
    }

    #[test]
    fn reject_emitting_final_state() {
        let entry = vec![HmmState::emitting(0, vec![(0, 1.0)])];
        assert!(HmmTopology::new(vec![(vec![1], entry)]).is_err());
    }

    #[test]
    fn reject_transition_to_missing_state() {
        let entry = vec![HmmState::emitting(0, vec![(5, 1.0)]), HmmState::final_state()];
        assert!(HmmTopology::new(vec![(vec![1], entry)]).is_err());
    }

    #[test]
    fn reject_out_of_order_state() {
        let text = "<Topology> <TopologyEntry> <ForPhones> 1 </ForPhones>
<State> 1 </State> </TopologyEntry> </Topology>";
        let err = HmmTopology::read(&mut KaldiReader::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, ModelError::InvalidStructure(_)));
    }
}
