// Transition model: the transition-id encoding of a trained acoustic model.
//
// A transition state is a (phone, HMM state, forward pdf, self-loop pdf)
// tuple, numbered from 1 in sorted tuple order. Each outgoing arc of the
// tuple's HMM state gets one transition id; ids are assigned consecutively
// from 1, so a transition id decodes to (transition state, arc index) by
// looking up the first id of its state.

use std::ops::RangeInclusive;

use amtools_core::PhoneId;

use crate::ModelError;
use crate::format::KaldiReader;
use crate::topology::{HmmState, HmmTopology};

/// Floor for the probability of leaving a state through a non-self-loop arc.
const MIN_NON_SELF_LOOP_PROB: f32 = 1.0e-10;

/// The tuple identifying one transition state.
///
/// Ordering is lexicographic over the fields in declaration order, which is
/// the order transition states are numbered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionTuple {
    pub phone: PhoneId,
    pub hmm_state: i32,
    pub forward_pdf: i32,
    pub self_loop_pdf: i32,
}

impl TransitionTuple {
    /// A tuple whose forward and self-loop arcs share one pdf.
    pub fn new(phone: PhoneId, hmm_state: i32, pdf: i32) -> Self {
        Self {
            phone,
            hmm_state,
            forward_pdf: pdf,
            self_loop_pdf: pdf,
        }
    }
}

/// Everything a transition id decodes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionInfo {
    pub transition_id: i32,
    pub pdf: i32,
    pub phone: PhoneId,
    pub hmm_state: i32,
    pub transition_index: i32,
    pub transition_state: i32,
    pub pdf_class: i32,
    pub prob: f32,
    pub is_self_loop: bool,
    pub is_final: bool,
}

/// A loaded transition model. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionModel {
    topo: HmmTopology,
    /// Indexed by transition state - 1.
    tuples: Vec<TransitionTuple>,
    /// Topology entry of each tuple's phone, indexed like `tuples`.
    tuple_entry: Vec<usize>,
    /// First transition id of each transition state; index 0 unused, one
    /// trailing entry holding `num_transition_ids() + 1`.
    state2id: Vec<i32>,
    /// Indexed by transition id; index 0 unused.
    id2state: Vec<i32>,
    id2pdf: Vec<i32>,
    log_probs: Vec<f32>,
    /// Indexed by transition state; index 0 unused.
    non_self_loop_log_probs: Vec<f32>,
    num_pdfs: i32,
}

impl TransitionModel {
    /// Build a model from its topology, sorted tuples and per-id log
    /// probabilities (`log_probs[0]` is unused).
    pub fn new(
        topo: HmmTopology,
        tuples: Vec<TransitionTuple>,
        log_probs: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let mut model = Self::derive(topo, tuples)?;
        if log_probs.len() != model.id2state.len() {
            return Err(ModelError::InvalidStructure(format!(
                "{} log-probabilities for {} transition ids",
                log_probs.len(),
                model.num_transition_ids()
            )));
        }
        model.log_probs = log_probs;
        model.compute_non_self_loop_log_probs();
        model.check()?;
        Ok(model)
    }

    /// Build a model whose transition probabilities are taken from the
    /// topology, as an untrained model would have them.
    pub fn from_topology(
        topo: HmmTopology,
        tuples: Vec<TransitionTuple>,
    ) -> Result<Self, ModelError> {
        let mut model = Self::derive(topo, tuples)?;
        let mut log_probs = vec![0.0; model.id2state.len()];
        for tid in model.transition_ids() {
            let tstate = model.id2state[tid as usize];
            let index = (tid - model.state2id[tstate as usize]) as usize;
            log_probs[tid as usize] = model.hmm_state_of(tstate).transitions[index].1.ln();
        }
        model.log_probs = log_probs;
        model.compute_non_self_loop_log_probs();
        model.check()?;
        Ok(model)
    }

    /// Parse a model file (text or binary). Data after the transition model,
    /// such as the acoustic model of a `.mdl` file, is ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ModelError> {
        let mut reader = KaldiReader::new(data);
        Self::read(&mut reader)
    }

    /// Read `<TransitionModel> ... </TransitionModel>`.
    pub fn read(reader: &mut KaldiReader<'_>) -> Result<Self, ModelError> {
        reader.expect_token("<TransitionModel>")?;
        let topo = HmmTopology::read(reader)?;

        let open = reader.read_token()?;
        let (separate_self_loop, close) = match open {
            "<Triples>" => (false, "</Triples>"),
            "<Tuples>" => (true, "</Tuples>"),
            other => {
                return Err(ModelError::UnexpectedToken {
                    expected: "<Triples>".to_string(),
                    found: other.to_string(),
                });
            }
        };
        let count = reader.read_i32()?;
        if count < 0 {
            return Err(ModelError::InvalidStructure(format!(
                "negative transition state count {count}"
            )));
        }
        let mut tuples = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            let phone = reader.read_i32()?;
            let hmm_state = reader.read_i32()?;
            let forward_pdf = reader.read_i32()?;
            let self_loop_pdf = if separate_self_loop {
                reader.read_i32()?
            } else {
                forward_pdf
            };
            tuples.push(TransitionTuple {
                phone,
                hmm_state,
                forward_pdf,
                self_loop_pdf,
            });
        }
        reader.expect_token(close)?;

        reader.expect_token("<LogProbs>")?;
        let log_probs = reader.read_f32_vector()?;
        reader.expect_token("</LogProbs>")?;
        reader.expect_token("</TransitionModel>")?;

        let model = Self::new(topo, tuples, log_probs)?;
        log::debug!(
            "read transition model: {} transition states, {} transition ids, {} pdfs{}",
            model.num_transition_states(),
            model.num_transition_ids(),
            model.num_pdfs(),
            if model.topology().is_hmm() {
                ""
            } else {
                ", separate self-loop pdf-classes"
            }
        );
        Ok(model)
    }

    /// Validate the tuples and build the id tables, leaving probabilities empty.
    fn derive(topo: HmmTopology, tuples: Vec<TransitionTuple>) -> Result<Self, ModelError> {
        if tuples.is_empty() {
            return Err(ModelError::InvalidStructure(
                "transition model has no transition states".to_string(),
            ));
        }
        if let Some(pair) = tuples.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(ModelError::InvalidStructure(format!(
                "transition tuples not sorted and unique at {:?}",
                pair[1]
            )));
        }

        let mut tuple_entry = Vec::with_capacity(tuples.len());
        let mut state2id = Vec::with_capacity(tuples.len() + 2);
        state2id.push(0);
        let mut next_id = 1;
        let mut num_pdfs = 0;
        for tuple in &tuples {
            let entry = topo.entry_index(tuple.phone).ok_or_else(|| {
                ModelError::InvalidStructure(format!("phone {} has no topology", tuple.phone))
            })?;
            let states = &topo.entries()[entry];
            let state = usize::try_from(tuple.hmm_state)
                .ok()
                .and_then(|s| states.get(s))
                .ok_or_else(|| {
                    ModelError::InvalidStructure(format!(
                        "HMM state {} out of range for phone {}",
                        tuple.hmm_state, tuple.phone
                    ))
                })?;
            if tuple.forward_pdf < 0 || tuple.self_loop_pdf < 0 {
                return Err(ModelError::InvalidStructure(format!(
                    "negative pdf in transition tuple {tuple:?}"
                )));
            }
            num_pdfs = num_pdfs.max(tuple.forward_pdf + 1).max(tuple.self_loop_pdf + 1);
            tuple_entry.push(entry);
            state2id.push(next_id);
            next_id += state.transitions.len() as i32;
        }
        state2id.push(next_id);

        let mut id2state = vec![0; next_id as usize];
        let mut id2pdf = vec![0; next_id as usize];
        for (s, tuple) in tuples.iter().enumerate() {
            let tstate = s + 1;
            let arcs = &topo.entries()[tuple_entry[s]][tuple.hmm_state as usize].transitions;
            for (index, &(dest, _)) in arcs.iter().enumerate() {
                let tid = state2id[tstate] as usize + index;
                id2state[tid] = tstate as i32;
                id2pdf[tid] = if dest == tuple.hmm_state {
                    tuple.self_loop_pdf
                } else {
                    tuple.forward_pdf
                };
            }
        }

        Ok(Self {
            topo,
            tuples,
            tuple_entry,
            state2id,
            id2state,
            id2pdf,
            log_probs: Vec::new(),
            non_self_loop_log_probs: Vec::new(),
            num_pdfs,
        })
    }

    fn compute_non_self_loop_log_probs(&mut self) {
        let mut non_self_loop = vec![0.0; self.tuples.len() + 1];
        for tstate in 1..=self.num_transition_states() {
            if let Some(tid) = self.self_loop_of(tstate) {
                let self_loop_prob = self.log_probs[tid as usize].exp();
                let mut non_self_loop_prob = 1.0 - self_loop_prob;
                if non_self_loop_prob <= 0.0 {
                    log::warn!(
                        "non-self-loop probability of transition state {tstate} is \
                         {non_self_loop_prob}, flooring to {MIN_NON_SELF_LOOP_PROB}"
                    );
                    non_self_loop_prob = MIN_NON_SELF_LOOP_PROB;
                }
                non_self_loop[tstate as usize] = non_self_loop_prob.ln();
            }
        }
        self.non_self_loop_log_probs = non_self_loop;
    }

    /// Verify that every transition id round-trips through its
    /// (transition state, index) pair.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.num_transition_ids() == 0 {
            return Err(ModelError::InvalidStructure(
                "transition model has no transition ids".to_string(),
            ));
        }
        if self.log_probs.len() != self.id2state.len() {
            return Err(ModelError::InvalidStructure(
                "log-probability table size mismatch".to_string(),
            ));
        }
        for tid in self.transition_ids() {
            let tstate = self.transition_id_to_transition_state(tid);
            let index = self.transition_id_to_transition_index(tid);
            if self.pair_to_transition_id(tstate, index) != tid {
                return Err(ModelError::InvalidStructure(format!(
                    "transition id {tid} does not round-trip through state {tstate}, index {index}"
                )));
            }
            if self.log_probs[tid as usize].is_nan() {
                return Err(ModelError::InvalidStructure(format!(
                    "transition id {tid} has NaN log-probability"
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sizes
    // -----------------------------------------------------------------------

    pub fn num_transition_ids(&self) -> i32 {
        self.id2state.len() as i32 - 1
    }

    pub fn num_transition_states(&self) -> i32 {
        self.tuples.len() as i32
    }

    /// One more than the largest pdf id any transition uses.
    pub fn num_pdfs(&self) -> i32 {
        self.num_pdfs
    }

    /// Largest phone id covered by the topology.
    pub fn num_phones(&self) -> i32 {
        self.topo.phones().last().copied().unwrap_or(0)
    }

    /// All valid transition ids, in ascending order.
    pub fn transition_ids(&self) -> RangeInclusive<i32> {
        1..=self.num_transition_ids()
    }

    pub fn topology(&self) -> &HmmTopology {
        &self.topo
    }

    // -----------------------------------------------------------------------
    // Transition state queries
    //
    // Transition states are 1-based. Passing one outside
    // 1..=num_transition_states() is a caller bug and panics.
    // -----------------------------------------------------------------------

    fn tuple(&self, tstate: i32) -> &TransitionTuple {
        assert!(
            tstate >= 1 && tstate <= self.num_transition_states(),
            "transition state {tstate} out of range [1, {}]",
            self.num_transition_states()
        );
        &self.tuples[tstate as usize - 1]
    }

    fn hmm_state_of(&self, tstate: i32) -> &HmmState {
        let tuple = self.tuple(tstate);
        &self.topo.entries()[self.tuple_entry[tstate as usize - 1]][tuple.hmm_state as usize]
    }

    pub fn transition_state_to_phone(&self, tstate: i32) -> PhoneId {
        self.tuple(tstate).phone
    }

    pub fn transition_state_to_hmm_state(&self, tstate: i32) -> i32 {
        self.tuple(tstate).hmm_state
    }

    pub fn transition_state_to_forward_pdf(&self, tstate: i32) -> i32 {
        self.tuple(tstate).forward_pdf
    }

    pub fn transition_state_to_self_loop_pdf(&self, tstate: i32) -> i32 {
        self.tuple(tstate).self_loop_pdf
    }

    /// Transition id of `tstate`'s self-loop arc, if it has one.
    pub fn self_loop_of(&self, tstate: i32) -> Option<i32> {
        let hmm_state = self.tuple(tstate).hmm_state;
        self.hmm_state_of(tstate)
            .transitions
            .iter()
            .position(|&(dest, _)| dest == hmm_state)
            .map(|index| self.pair_to_transition_id(tstate, index as i32))
    }

    /// Log-probability of leaving `tstate` through any arc but its self-loop.
    pub fn non_self_loop_log_prob(&self, tstate: i32) -> f32 {
        self.tuple(tstate);
        self.non_self_loop_log_probs[tstate as usize]
    }

    /// Transition id of the `index`-th arc out of `tstate`.
    pub fn pair_to_transition_id(&self, tstate: i32, index: i32) -> i32 {
        let arcs = self.hmm_state_of(tstate).transitions.len() as i32;
        assert!(
            index >= 0 && index < arcs,
            "transition index {index} out of range for state {tstate} with {arcs} arcs"
        );
        self.state2id[tstate as usize] + index
    }

    /// Transition state of `tuple`, if the model has one.
    pub fn tuple_to_transition_state(&self, tuple: &TransitionTuple) -> Option<i32> {
        self.tuples
            .binary_search(tuple)
            .ok()
            .map(|index| index as i32 + 1)
    }

    // -----------------------------------------------------------------------
    // Transition id queries
    //
    // Passing an id outside 1..=num_transition_ids() is a caller bug and
    // panics.
    // -----------------------------------------------------------------------

    fn checked_id(&self, tid: i32) -> usize {
        assert!(
            tid >= 1 && tid <= self.num_transition_ids(),
            "transition id {tid} out of range [1, {}]",
            self.num_transition_ids()
        );
        tid as usize
    }

    pub fn transition_id_to_transition_state(&self, tid: i32) -> i32 {
        self.id2state[self.checked_id(tid)]
    }

    /// Position of `tid` among the arcs leaving its transition state.
    pub fn transition_id_to_transition_index(&self, tid: i32) -> i32 {
        let tstate = self.transition_id_to_transition_state(tid);
        tid - self.state2id[tstate as usize]
    }

    pub fn transition_id_to_pdf(&self, tid: i32) -> i32 {
        self.id2pdf[self.checked_id(tid)]
    }

    pub fn transition_id_to_phone(&self, tid: i32) -> PhoneId {
        self.tuple(self.transition_id_to_transition_state(tid)).phone
    }

    pub fn transition_id_to_hmm_state(&self, tid: i32) -> i32 {
        self.tuple(self.transition_id_to_transition_state(tid)).hmm_state
    }

    /// Pdf-class of the topology state `tid` leaves, taking the self-loop
    /// pdf-class for self-loop arcs.
    pub fn transition_id_to_pdf_class(&self, tid: i32) -> i32 {
        let state = self.hmm_state_of(self.transition_id_to_transition_state(tid));
        if self.is_self_loop(tid) {
            state.self_loop_pdf_class
        } else {
            state.forward_pdf_class
        }
    }

    /// Destination HMM state of `tid`'s arc.
    fn destination(&self, tid: i32) -> i32 {
        let tstate = self.transition_id_to_transition_state(tid);
        let index = self.transition_id_to_transition_index(tid) as usize;
        self.hmm_state_of(tstate).transitions[index].0
    }

    /// Whether `tid` loops back to the HMM state it leaves.
    pub fn is_self_loop(&self, tid: i32) -> bool {
        self.destination(tid) == self.transition_id_to_hmm_state(tid)
    }

    /// Whether `tid` enters the final state of its phone's topology.
    pub fn is_final(&self, tid: i32) -> bool {
        let tstate = self.transition_id_to_transition_state(tid);
        let states = self.topo.entries()[self.tuple_entry[tstate as usize - 1]].len();
        self.destination(tid) as usize + 1 == states
    }

    pub fn transition_log_prob(&self, tid: i32) -> f32 {
        self.log_probs[self.checked_id(tid)]
    }

    /// Linear transition probability, `exp(transition_log_prob(tid))`.
    pub fn transition_prob(&self, tid: i32) -> f32 {
        self.transition_log_prob(tid).exp()
    }

    /// Full decomposition of `tid`.
    pub fn decompose(&self, tid: i32) -> TransitionInfo {
        TransitionInfo {
            transition_id: tid,
            pdf: self.transition_id_to_pdf(tid),
            phone: self.transition_id_to_phone(tid),
            hmm_state: self.transition_id_to_hmm_state(tid),
            transition_index: self.transition_id_to_transition_index(tid),
            transition_state: self.transition_id_to_transition_state(tid),
            pdf_class: self.transition_id_to_pdf_class(tid),
            prob: self.transition_prob(tid),
            is_self_loop: self.is_self_loop(tid),
            is_final: self.is_final(tid),
        }
    }
}
