// Pdf-class configuration: silence phone set and per-phone class counts.

use hashbrown::HashSet;

use crate::PhoneId;

/// Default `--sil-phones` value.
pub const DEFAULT_SIL_PHONES: &str = "1,2,3";

/// Default number of pdf-classes for silence phones.
pub const DEFAULT_SIL_PDF_CLASSES: i32 = 5;

/// Default number of pdf-classes for non-silence phones.
pub const DEFAULT_NON_SIL_PDF_CLASSES: i32 = 3;

/// Error raised by [`parse_phone_list`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SilencePhonesError {
    #[error("empty entry at position {position} in phone list {list:?}")]
    EmptyEntry { list: String, position: usize },
    #[error("invalid phone id {token:?} at position {position} in phone list {list:?}")]
    InvalidPhone {
        list: String,
        token: String,
        position: usize,
    },
}

/// A set of phone ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneSet {
    phones: HashSet<PhoneId>,
}

impl PhoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, phone: PhoneId) -> bool {
        self.phones.contains(&phone)
    }

    pub fn insert(&mut self, phone: PhoneId) -> bool {
        self.phones.insert(phone)
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    /// Members in ascending order.
    pub fn sorted(&self) -> Vec<PhoneId> {
        let mut phones: Vec<PhoneId> = self.phones.iter().copied().collect();
        phones.sort_unstable();
        phones
    }
}

impl FromIterator<PhoneId> for PhoneSet {
    fn from_iter<I: IntoIterator<Item = PhoneId>>(iter: I) -> Self {
        Self {
            phones: iter.into_iter().collect(),
        }
    }
}

/// Parse a comma-separated list of phone ids such as `"1,2,3"`.
///
/// Surrounding whitespace around each entry is ignored. A string that is
/// empty (or only whitespace) yields the empty set; an empty entry inside a
/// non-empty list, a negative id or anything that is not an integer is an
/// error naming the offending entry.
pub fn parse_phone_list(list: &str) -> Result<PhoneSet, SilencePhonesError> {
    let mut set = PhoneSet::new();
    if list.trim().is_empty() {
        return Ok(set);
    }

    for (position, token) in list.split(',').enumerate() {
        let token = token.trim();
        if token.is_empty() {
            return Err(SilencePhonesError::EmptyEntry {
                list: list.to_string(),
                position,
            });
        }
        match token.parse::<PhoneId>() {
            Ok(phone) if phone >= 0 => {
                log::debug!("silence phone: {phone}");
                set.insert(phone);
            }
            _ => {
                return Err(SilencePhonesError::InvalidPhone {
                    list: list.to_string(),
                    token: token.to_string(),
                    position,
                });
            }
        }
    }
    Ok(set)
}

/// How many pdf-classes each phone's HMM is enumerated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfClassConfig {
    pub silence: PhoneSet,
    pub sil_pdf_classes: i32,
    pub non_sil_pdf_classes: i32,
}

impl PdfClassConfig {
    pub fn new(silence: PhoneSet, sil_pdf_classes: i32, non_sil_pdf_classes: i32) -> Self {
        Self {
            silence,
            sil_pdf_classes,
            non_sil_pdf_classes,
        }
    }

    /// Number of pdf-classes for `phone`, selected by silence membership.
    #[inline]
    pub fn class_count(&self, phone: PhoneId) -> i32 {
        if self.silence.contains(phone) {
            self.sil_pdf_classes
        } else {
            self.non_sil_pdf_classes
        }
    }
}

impl Default for PdfClassConfig {
    fn default() -> Self {
        Self {
            silence: [1, 2, 3].into_iter().collect(),
            sil_pdf_classes: DEFAULT_SIL_PDF_CLASSES,
            non_sil_pdf_classes: DEFAULT_NON_SIL_PDF_CLASSES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_list() {
        let set = parse_phone_list(DEFAULT_SIL_PHONES).unwrap();
        assert_eq!(set.sorted(), vec![1, 2, 3]);
    }

    #[test]
    fn parse_tolerates_spaces_and_repeats() {
        let set = parse_phone_list(" 7, 3 ,7").unwrap();
        assert_eq!(set.sorted(), vec![3, 7]);
    }

    #[test]
    fn empty_list_is_empty_set() {
        assert!(parse_phone_list("").unwrap().is_empty());
        assert!(parse_phone_list("  ").unwrap().is_empty());
    }

    #[test]
    fn reject_empty_entry() {
        let err = parse_phone_list("1,,2").unwrap_err();
        assert_eq!(
            err,
            SilencePhonesError::EmptyEntry {
                list: "1,,2".to_string(),
                position: 1
            }
        );
        assert!(matches!(
            parse_phone_list("1,2,").unwrap_err(),
            SilencePhonesError::EmptyEntry { position: 2, .. }
        ));
    }

    #[test]
    fn reject_malformed_entries() {
        for (list, bad) in [("1,x", "x"), ("-4", "-4"), ("1,2.5", "2.5"), ("sil", "sil")] {
            match parse_phone_list(list).unwrap_err() {
                SilencePhonesError::InvalidPhone { token, .. } => assert_eq!(token, bad),
                other => panic!("unexpected error for {list:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn class_count_follows_silence_membership() {
        let config = PdfClassConfig::new(parse_phone_list("1,2,3").unwrap(), 5, 3);
        assert_eq!(config.class_count(2), 5);
        assert_eq!(config.class_count(4), 3);
        assert_eq!(config.class_count(0), 3);
    }

    #[test]
    fn default_config_matches_cli_defaults() {
        let config = PdfClassConfig::default();
        assert_eq!(config.silence, parse_phone_list(DEFAULT_SIL_PHONES).unwrap());
        assert_eq!(config.class_count(1), DEFAULT_SIL_PDF_CLASSES);
        assert_eq!(config.class_count(9), DEFAULT_NON_SIL_PDF_CLASSES);
    }
}
