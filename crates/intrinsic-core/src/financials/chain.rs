//! Ranked ACTUAL -> DERIVED -> DEFAULT resolution.
//!
//! A chain is an ordered list of probe functions. Each probe looks at the
//! context and either produces a value with a short note or declines; the
//! first probe that produces a value wins and its step's provenance is
//! attached. Every attempt is written to the audit trail.

use rust_decimal::Decimal;
use tracing::{debug, info, trace};

use crate::types::{AuditTrail, Provenance, Tagged};

/// A successful probe: the value plus a note describing how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub value: Decimal,
    pub note: String,
}

impl Probe {
    pub fn new(value: Decimal, note: impl Into<String>) -> Self {
        Probe {
            value,
            note: note.into(),
        }
    }
}

pub type ProbeFn<C> = fn(&C) -> Option<Probe>;

struct Step<C> {
    provenance: Provenance,
    label: &'static str,
    probe: ProbeFn<C>,
}

pub struct ResolutionChain<C> {
    field: &'static str,
    steps: Vec<Step<C>>,
}

impl<C> ResolutionChain<C> {
    pub fn new(field: &'static str) -> Self {
        ResolutionChain {
            field,
            steps: Vec::new(),
        }
    }

    pub fn actual(self, label: &'static str, probe: ProbeFn<C>) -> Self {
        self.step(Provenance::Actual, label, probe)
    }

    pub fn derived(self, label: &'static str, probe: ProbeFn<C>) -> Self {
        self.step(Provenance::Derived, label, probe)
    }

    fn step(mut self, provenance: Provenance, label: &'static str, probe: ProbeFn<C>) -> Self {
        self.steps.push(Step {
            provenance,
            label,
            probe,
        });
        self
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    /// First successful probe, or `None` when every step declines.
    pub fn resolve(&self, ctx: &C, trail: &mut AuditTrail) -> Option<Tagged<Decimal>> {
        for step in &self.steps {
            match (step.probe)(ctx) {
                Some(probe) => {
                    debug!(
                        field = self.field,
                        value = %probe.value,
                        provenance = %step.provenance,
                        via = step.label,
                        "resolved input"
                    );
                    trail.record(
                        "financials",
                        self.field,
                        probe.value,
                        Some(step.provenance),
                        probe.note.clone(),
                    );
                    return Some(Tagged::new(probe.value, step.provenance, probe.note));
                }
                None => {
                    trace!(field = self.field, via = step.label, "probe declined");
                }
            }
        }
        None
    }

    /// Resolve, falling back to `default` tagged DEFAULT.
    pub fn resolve_or(&self, ctx: &C, trail: &mut AuditTrail, default: Probe) -> Tagged<Decimal> {
        if let Some(found) = self.resolve(ctx, trail) {
            return found;
        }
        info!(
            field = self.field,
            value = %default.value,
            reason = %default.note,
            "falling back to default"
        );
        trail.record(
            "financials",
            self.field,
            default.value,
            Some(Provenance::Default),
            default.note.clone(),
        );
        Tagged::defaulted(default.value, default.note)
    }
}
