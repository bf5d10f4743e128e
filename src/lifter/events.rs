//! Event logging for the lifting pipeline.
//!
//! Every lift records what its passes did (fields resolved, constants folded, variables
//! inlined, blocks absorbed) and what it had to degrade (unresolved comparisons,
//! unsupported instructions, contained faults). Events can be inspected for debugging or
//! safely ignored.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API that records the event when dropped
//!
//! # Example
//!
//! ```rust
//! use isilift::lifter::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .block(0)
//!     .instruction(2)
//!     .message("5 + 3 -> 8");
//! log.record(EventKind::UnresolvedCompare).instruction(4);
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.summary(), "1 constant folded");
//! ```

use std::{collections::HashMap, fmt};

use strum::{EnumCount, EnumIter};

use crate::lifter::ir::BlockId;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum EventKind {
    /// A `deref(var + offset)` was resolved to a field access.
    FieldResolved,
    /// A variable's type was inferred.
    TypePropagated,
    /// A raw address was replaced by a metadata usage.
    MetadataInlined,
    /// A raw address was replaced by a string literal.
    StringInlined,
    /// Arithmetic on constants was folded.
    ConstantFolded,
    /// A single-use variable was inlined into its use site.
    VariableInlined,
    /// A branch target was absorbed into its owner's conditional.
    BlockAbsorbed,

    /// A comparison had no consuming conditional jump.
    UnresolvedCompare,
    /// An instruction had no lifting rule.
    UnsupportedInstruction,
    /// A call target could not be resolved to a known function.
    UnresolvedCall,
    /// A fixed-point loop hit its iteration cap.
    IterationLimit,
    /// Lifting failed and the method was replaced with a fault block.
    Fault,

    /// A pass completed with changes.
    PassCompleted,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::FieldResolved => "field resolved",
            Self::TypePropagated => "type propagated",
            Self::MetadataInlined => "metadata inlined",
            Self::StringInlined => "string inlined",
            Self::ConstantFolded => "constant folded",
            Self::VariableInlined => "variable inlined",
            Self::BlockAbsorbed => "block absorbed",
            Self::UnresolvedCompare => "unresolved compare",
            Self::UnsupportedInstruction => "unsupported instruction",
            Self::UnresolvedCall => "unresolved call",
            Self::IterationLimit => "iteration limit reached",
            Self::Fault => "fault",
            Self::PassCompleted => "pass completed",
        }
    }

    /// Returns true if this event represents a rewrite of the lifted code.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::FieldResolved
                | Self::TypePropagated
                | Self::MetadataInlined
                | Self::StringInlined
                | Self::ConstantFolded
                | Self::VariableInlined
                | Self::BlockAbsorbed
        )
    }

    /// Returns true if this event marks output that was degraded rather than lifted.
    #[must_use]
    pub fn is_degradation(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedCompare
                | Self::UnsupportedInstruction
                | Self::UnresolvedCall
                | Self::IterationLimit
                | Self::Fault
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Block where the event occurred.
    pub block: Option<BlockId>,
    /// Instruction index the event relates to.
    pub instruction: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Pass that recorded the event.
    pub pass: Option<&'static str>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(block) = self.block {
            write!(f, " B{block}")?;
        }
        if let Some(instruction) = self.instruction {
            write!(f, " @{instruction}")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    block: Option<BlockId>,
    instruction: Option<usize>,
    message: Option<String>,
    pass: Option<&'static str>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            block: None,
            instruction: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the block where the event occurred.
    pub fn block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets the instruction the event relates to.
    pub fn instruction(mut self, index: usize) -> Self {
        self.instruction = Some(index);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a pass.
    pub fn pass(mut self, pass_name: &'static str) -> Self {
        self.pass = Some(pass_name);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            block: self.block.take(),
            instruction: self.instruction.take(),
            message,
            pass: self.pass.take(),
        });
    }
}

/// Collection of events from one lift.
///
/// Events can be appended through shared references, so a log can be handed to passes
/// without threading `&mut` through every call.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.iter().any(|e| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events that mark degraded output.
    pub fn degradations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_degradation())
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for event in self.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of the transformations.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}
