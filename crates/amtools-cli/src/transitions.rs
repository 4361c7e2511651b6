// Transition-id dump.
// Origin: print-transitions.cc:54-78
//
// One line per transition id:
//   <tid> <pdf> <phone> <hmm-state> <index> <transition-state> <prob> <self-loop> <final>
// optionally followed by the pdf-class, or one line per transition state:
//   <tstate> <phone> <hmm-state> <forward-pdf> <self-loop-pdf> <non-self-loop-log-prob>

use std::fmt;
use std::io::Write;

use amtools_model::transition::TransitionModel;

use crate::EnumerateError;

/// Significant digits of [`GeneralFloat`].
const PRECISION: i32 = 6;

/// Formats a float the way a default-configured C++ stream does (`%g`):
/// six significant digits, trailing zeros removed, scientific notation
/// below 1e-4 or from 1e6 up.
#[derive(Debug, Clone, Copy)]
pub struct GeneralFloat(pub f32);

impl fmt::Display for GeneralFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.0;
        if x.is_nan() {
            return f.write_str("nan");
        }
        if x.is_infinite() {
            return f.write_str(if x < 0.0 { "-inf" } else { "inf" });
        }
        if x == 0.0 {
            return f.write_str(if x.is_sign_negative() { "-0" } else { "0" });
        }

        // The exponent after rounding to PRECISION digits decides the style.
        let sci = format!("{:.*e}", (PRECISION - 1) as usize, x);
        let Some((mantissa, exp)) = sci.split_once('e') else {
            return f.write_str(&sci);
        };
        let exp: i32 = exp.parse().map_err(|_| fmt::Error)?;

        if exp < -4 || exp >= PRECISION {
            let sign = if exp < 0 { '-' } else { '+' };
            write!(f, "{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
        } else {
            let fixed = format!("{:.*}", (PRECISION - 1 - exp) as usize, x);
            f.write_str(trim_zeros(&fixed))
        }
    }
}

fn trim_zeros(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Write the decomposition of every transition id in ascending order.
///
/// Returns the number of lines written.
pub fn enumerate_transitions<W: Write>(
    model: &TransitionModel,
    out: &mut W,
    with_pdf_class: bool,
) -> Result<u64, EnumerateError> {
    let mut lines = 0;
    for tid in model.transition_ids() {
        let info = model.decompose(tid);
        write!(
            out,
            "{} {} {} {} {} {} {} {} {}",
            info.transition_id,
            info.pdf,
            info.phone,
            info.hmm_state,
            info.transition_index,
            info.transition_state,
            GeneralFloat(info.prob),
            u8::from(info.is_self_loop),
            u8::from(info.is_final),
        )?;
        if with_pdf_class {
            write!(out, " {}", info.pdf_class)?;
        }
        writeln!(out)?;
        lines += 1;
    }
    Ok(lines)
}

/// Write one line per transition state in ascending order.
pub fn enumerate_transition_states<W: Write>(
    model: &TransitionModel,
    out: &mut W,
) -> Result<u64, EnumerateError> {
    let mut lines = 0;
    for tstate in 1..=model.num_transition_states() {
        writeln!(
            out,
            "{} {} {} {} {} {}",
            tstate,
            model.transition_state_to_phone(tstate),
            model.transition_state_to_hmm_state(tstate),
            model.transition_state_to_forward_pdf(tstate),
            model.transition_state_to_self_loop_pdf(tstate),
            GeneralFloat(model.non_self_loop_log_prob(tstate)),
        )?;
        lines += 1;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amtools_model::topology::{HmmState, HmmTopology};
    use amtools_model::transition::TransitionTuple;

    /// Phone 1: one emitting state. Phone 2: two emitting states.
    fn small_model() -> TransitionModel {
        let one_state = vec![
            HmmState::emitting(0, vec![(0, 0.5), (1, 0.5)]),
            HmmState::final_state(),
        ];
        let two_state = vec![
            HmmState::emitting(0, vec![(0, 0.75), (1, 0.25)]),
            HmmState::emitting(1, vec![(1, 0.5), (2, 0.5)]),
            HmmState::final_state(),
        ];
        let topo = HmmTopology::new(vec![(vec![1], one_state), (vec![2], two_state)]).unwrap();
        let tuples = vec![
            TransitionTuple::new(1, 0, 0),
            TransitionTuple::new(2, 0, 1),
            TransitionTuple::new(2, 1, 2),
        ];
        TransitionModel::from_topology(topo, tuples).unwrap()
    }

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<u64, EnumerateError>,
    {
        let mut out = Vec::new();
        write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn general_float_fixed() {
        assert_eq!(GeneralFloat(0.5).to_string(), "0.5");
        assert_eq!(GeneralFloat(0.75).to_string(), "0.75");
        assert_eq!(GeneralFloat(1.0).to_string(), "1");
        assert_eq!(GeneralFloat(0.1).to_string(), "0.1");
        assert_eq!(GeneralFloat(0.0001).to_string(), "0.0001");
        assert_eq!(GeneralFloat(123456.0).to_string(), "123456");
        assert_eq!(GeneralFloat(-0.693_147_2).to_string(), "-0.693147");
        assert_eq!(GeneralFloat(2.0 / 3.0).to_string(), "0.666667");
    }

    #[test]
    fn general_float_scientific() {
        assert_eq!(GeneralFloat(1e-5).to_string(), "1e-05");
        assert_eq!(GeneralFloat(2.5e-7).to_string(), "2.5e-07");
        assert_eq!(GeneralFloat(1_234_567.0).to_string(), "1.23457e+06");
        assert_eq!(GeneralFloat(999_999.7).to_string(), "1e+06");
        assert_eq!(GeneralFloat(-3e10).to_string(), "-3e+10");
    }

    #[test]
    fn general_float_special() {
        assert_eq!(GeneralFloat(0.0).to_string(), "0");
        assert_eq!(GeneralFloat(f32::INFINITY).to_string(), "inf");
        assert_eq!(GeneralFloat(f32::NEG_INFINITY).to_string(), "-inf");
        assert_eq!(GeneralFloat(f32::NAN).to_string(), "nan");
    }

    #[test]
    fn transition_lines() {
        let model = small_model();
        let text = render(|out| enumerate_transitions(&model, out, false));
        assert_eq!(
            text,
            "1 0 1 0 0 1 0.5 1 0\n\
             2 0 1 0 1 1 0.5 0 1\n\
             3 1 2 0 0 2 0.75 1 0\n\
             4 1 2 0 1 2 0.25 0 0\n\
             5 2 2 1 0 3 0.5 1 0\n\
             6 2 2 1 1 3 0.5 0 1\n"
        );
    }

    #[test]
    fn transition_ids_are_contiguous() {
        let model = small_model();
        let text = render(|out| enumerate_transitions(&model, out, false));
        let ids: Vec<i32> = text
            .lines()
            .map(|line| line.split(' ').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(ids, (1..=model.num_transition_ids()).collect::<Vec<_>>());
        assert!(text.lines().all(|line| line.split(' ').count() == 9));
    }

    #[test]
    fn pdf_class_column() {
        let model = small_model();
        let text = render(|out| enumerate_transitions(&model, out, true));
        let classes: Vec<&str> = text
            .lines()
            .map(|line| line.rsplit(' ').next().unwrap())
            .collect();
        assert_eq!(classes, ["0", "0", "0", "0", "1", "1"]);
        assert!(text.lines().all(|line| line.split(' ').count() == 10));
    }

    #[test]
    fn transition_state_lines() {
        let model = small_model();
        let text = render(|out| enumerate_transition_states(&model, out));
        assert_eq!(
            text,
            "1 1 0 0 0 -0.693147\n\
             2 2 0 1 1 -1.38629\n\
             3 2 1 2 2 -0.693147\n"
        );
    }

    #[test]
    fn output_is_stable() {
        let model = small_model();
        let first = render(|out| enumerate_transitions(&model, out, false));
        let second = render(|out| enumerate_transitions(&model, out, false));
        assert_eq!(first, second);
    }
}
