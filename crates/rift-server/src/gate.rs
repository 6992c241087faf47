//! Validity gate: decides whether a content change is safe to hot-update.

use std::collections::HashSet;
use std::path::Path;

use crate::sfc::{self, SfcErrorCode};

/// Outcome of evaluating one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Propagate,
    Suppress,
}

impl GateDecision {
    pub fn is_propagate(self) -> bool {
        self == GateDecision::Propagate
    }
}

/// Per-path validity policy.
///
/// Only single-file components are checked. A component with no structural
/// errors, or with exactly one error whose code is on the benign list, is
/// valid. The default benign list holds the missing-end-tag code, which is
/// what an element being typed looks like.
#[derive(Debug, Clone)]
pub struct ValidityGate {
    benign: HashSet<u32>,
}

impl Default for ValidityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidityGate {
    pub fn new() -> Self {
        Self::with_benign_codes([SfcErrorCode::MissingEndTag.code()])
    }

    pub fn with_benign_codes(codes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            benign: codes.into_iter().collect(),
        }
    }

    pub fn is_benign(&self, code: u32) -> bool {
        self.benign.contains(&code)
    }

    pub fn evaluate(&self, path: &Path, text: &str) -> GateDecision {
        if !is_component(path) {
            return GateDecision::Propagate;
        }

        let errors = sfc::parse(text).errors;
        let decision = match errors.as_slice() {
            [] => GateDecision::Propagate,
            [only] if self.is_benign(only.code.code()) => GateDecision::Propagate,
            _ => GateDecision::Suppress,
        };

        tracing::trace!(
            target: "rift::watcher",
            path = %path.display(),
            errors = errors.len(),
            ?decision,
            "gate evaluated"
        );
        decision
    }
}

pub(crate) fn is_component(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "vue")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vue() -> &'static Path {
        Path::new("/project/src/App.vue")
    }

    #[test]
    fn non_component_files_always_propagate() {
        let gate = ValidityGate::new();
        assert_eq!(
            gate.evaluate(Path::new("/project/main.js"), "<<<"),
            GateDecision::Propagate
        );
    }

    #[test]
    fn clean_component_propagates() {
        let gate = ValidityGate::new();
        let text = "<template><div>{{ a }}</div></template><script>export default {}</script>";
        assert_eq!(gate.evaluate(vue(), text), GateDecision::Propagate);
    }

    #[test]
    fn two_errors_suppress() {
        let gate = ValidityGate::new();
        assert_eq!(
            gate.evaluate(vue(), "<template><div>"),
            GateDecision::Suppress
        );
    }

    #[test]
    fn single_benign_error_propagates() {
        let gate = ValidityGate::new();
        assert_eq!(
            gate.evaluate(vue(), "<template><div><span></div></template>"),
            GateDecision::Propagate
        );
    }

    #[test]
    fn single_other_error_suppresses() {
        let gate = ValidityGate::new();
        assert_eq!(
            gate.evaluate(vue(), "<template><div></p></div></template>"),
            GateDecision::Suppress
        );
    }

    #[test]
    fn allow_list_is_injectable() {
        let gate = ValidityGate::with_benign_codes([SfcErrorCode::InvalidEndTag.code()]);
        assert_eq!(
            gate.evaluate(vue(), "<template><div></p></div></template>"),
            GateDecision::Propagate
        );
        assert_eq!(
            gate.evaluate(vue(), "<template><div><span></div></template>"),
            GateDecision::Suppress
        );
    }
}
