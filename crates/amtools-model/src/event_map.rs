// Decision-tree event maps.
//
// An event is a list of (key, value) pairs sorted by key. Context phones use
// keys 0..N-1 and the pdf-class uses key -1, so the pdf-class always sorts
// first. An event map walks the tree by looking values up in the event until
// it reaches a constant leaf.
//
// `map` walks iteratively. `read` and `max_result` recurse once per tree
// level, so the depth of a tree they accept is bounded by the thread stack.

use crate::ModelError;
use crate::format::KaldiReader;

pub type EventKey = i32;
pub type EventValue = i32;
pub type EventAnswer = i32;

/// Event key under which the pdf-class is stored.
pub const PDF_CLASS_KEY: EventKey = -1;

/// Look up `key` in a key-sorted event.
#[inline]
pub fn lookup(event: &[(EventKey, EventValue)], key: EventKey) -> Option<EventValue> {
    event
        .binary_search_by_key(&key, |&(k, _)| k)
        .ok()
        .map(|i| event[i].1)
}

/// A node of the decision tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMap {
    /// Leaf: always answers `answer` (serialized as `CE`).
    Constant(EventAnswer),
    /// Indexes `table` by the event's value for `key` (serialized as `TE`).
    /// `None` entries have no answer.
    Table {
        key: EventKey,
        table: Vec<Option<EventMap>>,
    },
    /// Goes to `yes` when the value for `key` is in `yes_set`, otherwise to
    /// `no` (serialized as `SE`). `yes_set` is sorted and deduplicated.
    Split {
        key: EventKey,
        yes_set: Vec<EventValue>,
        yes: Box<EventMap>,
        no: Box<EventMap>,
    },
}

impl EventMap {
    /// Build a split node, normalizing the yes-set.
    pub fn split(key: EventKey, mut yes_set: Vec<EventValue>, yes: EventMap, no: EventMap) -> Self {
        yes_set.sort_unstable();
        yes_set.dedup();
        EventMap::Split {
            key,
            yes_set,
            yes: Box::new(yes),
            no: Box::new(no),
        }
    }

    /// Evaluate the tree on a key-sorted event.
    ///
    /// Returns `None` if a key the tree asks about is missing from the event,
    /// or a table has no entry for the event's value.
    pub fn map(&self, event: &[(EventKey, EventValue)]) -> Option<EventAnswer> {
        let mut node = self;
        loop {
            node = match node {
                EventMap::Constant(answer) => return Some(*answer),
                EventMap::Table { key, table } => {
                    let value = lookup(event, *key)?;
                    let slot = usize::try_from(value).ok()?;
                    table.get(slot)?.as_ref()?
                }
                EventMap::Split {
                    key,
                    yes_set,
                    yes,
                    no,
                } => {
                    let value = lookup(event, *key)?;
                    if yes_set.binary_search(&value).is_ok() {
                        &**yes
                    } else {
                        &**no
                    }
                }
            };
        }
    }

    /// Largest answer any leaf can produce, or `None` for a tree with no leaves.
    pub fn max_result(&self) -> Option<EventAnswer> {
        match self {
            EventMap::Constant(answer) => Some(*answer),
            EventMap::Table { table, .. } => {
                table.iter().flatten().filter_map(EventMap::max_result).max()
            }
            EventMap::Split { yes, no, .. } => yes.max_result().max(no.max_result()),
        }
    }

    /// Read an event map, where `NULL` (an empty table entry) yields `None`.
    pub fn read(reader: &mut KaldiReader<'_>) -> Result<Option<EventMap>, ModelError> {
        match reader.peek() {
            Some(b'N') => {
                reader.expect_token("NULL")?;
                Ok(None)
            }
            Some(b'C') => {
                reader.expect_token("CE")?;
                Ok(Some(EventMap::Constant(reader.read_i32()?)))
            }
            Some(b'T') => {
                reader.expect_token("TE")?;
                let key = reader.read_i32()?;
                let size = reader.read_u32()?;
                reader.expect_token("(")?;
                let mut table = Vec::with_capacity(size.min(1 << 16) as usize);
                for _ in 0..size {
                    table.push(EventMap::read(reader)?);
                }
                reader.expect_token(")")?;
                Ok(Some(EventMap::Table { key, table }))
            }
            Some(b'S') => {
                reader.expect_token("SE")?;
                let key = reader.read_i32()?;
                let yes_set = reader.read_i32_vec()?;
                reader.expect_token("{")?;
                let yes = Self::read_required(reader, "split yes-branch")?;
                let no = Self::read_required(reader, "split no-branch")?;
                reader.expect_token("}")?;
                Ok(Some(EventMap::split(key, yes_set, yes, no)))
            }
            Some(other) => Err(ModelError::InvalidStructure(format!(
                "unknown event map type starting with {:?} at byte {}",
                other as char,
                reader.position()
            ))),
            None => Err(ModelError::Truncated {
                offset: reader.position(),
                needed: 1,
            }),
        }
    }

    /// Read an event map that must not be `NULL`.
    pub fn read_required(reader: &mut KaldiReader<'_>, what: &str) -> Result<EventMap, ModelError> {
        Self::read(reader)?
            .ok_or_else(|| ModelError::InvalidStructure(format!("{what} is NULL")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::BinaryWriter;

    fn event(pdf_class: i32, phones: &[i32]) -> Vec<(EventKey, EventValue)> {
        let mut ev = vec![(PDF_CLASS_KEY, pdf_class)];
        ev.extend(phones.iter().enumerate().map(|(i, &p)| (i as EventKey, p)));
        ev
    }

    /// Splits on the central phone, then on the pdf-class.
    fn sample_tree() -> EventMap {
        EventMap::split(
            1,
            vec![3, 1],
            EventMap::Table {
                key: PDF_CLASS_KEY,
                table: vec![
                    Some(EventMap::Constant(0)),
                    None,
                    Some(EventMap::Constant(1)),
                ],
            },
            EventMap::Constant(7),
        )
    }

    #[test]
    fn lookup_sorted_event() {
        let ev = event(2, &[4, 5, 6]);
        assert_eq!(lookup(&ev, PDF_CLASS_KEY), Some(2));
        assert_eq!(lookup(&ev, 2), Some(6));
        assert_eq!(lookup(&ev, 3), None);
    }

    #[test]
    fn split_normalizes_yes_set() {
        match EventMap::split(0, vec![5, 1, 5, 3], EventMap::Constant(0), EventMap::Constant(1)) {
            EventMap::Split { yes_set, .. } => assert_eq!(yes_set, vec![1, 3, 5]),
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn map_walks_split_and_table() {
        let tree = sample_tree();
        assert_eq!(tree.map(&event(0, &[0, 1, 0])), Some(0));
        assert_eq!(tree.map(&event(2, &[9, 3, 9])), Some(1));
        assert_eq!(tree.map(&event(0, &[0, 2, 0])), Some(7));
    }

    #[test]
    fn map_reports_unresolvable_events() {
        let tree = sample_tree();
        // NULL table entry
        assert_eq!(tree.map(&event(1, &[0, 1, 0])), None);
        // value past the end of the table
        assert_eq!(tree.map(&event(3, &[0, 1, 0])), None);
        // negative value
        assert_eq!(tree.map(&event(-2, &[0, 1, 0])), None);
        // key 1 missing from a monophone-sized event
        assert_eq!(tree.map(&event(0, &[1])), None);
    }

    #[test]
    fn max_result_over_all_leaves() {
        assert_eq!(sample_tree().max_result(), Some(7));
        let empty = EventMap::Table {
            key: 0,
            table: vec![None, None],
        };
        assert_eq!(empty.max_result(), None);
    }

    #[test]
    fn read_text_tree() {
        let text = b"SE 1 [ 1 3 ]\n{ TE -1 3 ( CE 0 NULL CE 1 ) \nCE 7 \n} ";
        let mut reader = KaldiReader::new(text);
        let tree = EventMap::read(&mut reader).unwrap().unwrap();
        assert_eq!(tree, sample_tree());
    }

    #[test]
    fn read_binary_tree() {
        let mut w = BinaryWriter::new();
        w.token("SE").i32(1).i32_vec(&[1, 3]).token("{");
        w.token("TE").i32(-1).u32(3).token("(");
        w.token("CE").i32(0).token("NULL").token("CE").i32(1);
        w.token(")");
        w.token("CE").i32(7).token("}");
        let mut reader = KaldiReader::new(&w.buf);
        let tree = EventMap::read(&mut reader).unwrap().unwrap();
        assert_eq!(tree, sample_tree());
        assert_eq!(reader.position(), w.buf.len());
    }

    #[test]
    fn read_null_map() {
        let mut reader = KaldiReader::new(b"NULL ");
        assert_eq!(EventMap::read(&mut reader).unwrap(), None);
    }

    #[test]
    fn reject_null_split_branch() {
        let mut reader = KaldiReader::new(b"SE 0 [ 1 ] { NULL CE 1 }");
        let err = EventMap::read(&mut reader).unwrap_err();
        assert!(matches!(err, ModelError::InvalidStructure(_)));
    }

    #[test]
    fn reject_unknown_node() {
        let mut reader = KaldiReader::new(b"XE 0");
        let err = EventMap::read(&mut reader).unwrap_err();
        assert!(matches!(err, ModelError::InvalidStructure(_)));
    }

    #[test]
    fn reject_short_table() {
        let mut reader = KaldiReader::new(b"TE 0 3 ( CE 0 CE 1 )");
        assert!(EventMap::read(&mut reader).is_err());
    }
}
