//! # Automata Runtime
//!
//! A generic deterministic finite automaton engine used to parse and
//! produce byte streams incrementally, composable into higher-level
//! grammars. This is the "hard part" that the rest of the protocol stack's
//! type codecs (`crate::codec`) are built from, and it is also the target
//! that regex compilation (`crate::automata::regex`) lowers into.
//!
//! ## Design
//!
//! A [`State`] is a node with transitions keyed by an input byte, plus an
//! optional default ("any other byte") transition and a list of epsilon
//! transitions followed eagerly before a byte is examined. A [`Dfa`] owns a
//! flat vector of states and a start state; it evaluates `terminal` iff it
//! was constructed terminal *and* the active sub-state is itself terminal.
//!
//! Composition — running one `Dfa` inside another — is realized by
//! [`Cursor`], an explicit stack of `(Dfa, state)` frames rather than a
//! graph of `Weak` parent pointers: the innermost frame is offered every
//! symbol first, and only on failure is the symbol offered to each
//! enclosing frame in turn (outer-before-further-outer). This is the
//! idiomatic Rust shape for what the source models as upward delegation
//! through parent pointers — it avoids an `Rc<RefCell<_>>` ownership cycle
//! while preserving the exact fallback rule in §4.1: an enclosing machine
//! is only ever offered a symbol the inner machine could not consume.

pub mod regex;
pub mod source;

use std::collections::HashMap;
use std::rc::Rc;

pub use source::{PeekableSource, SliceSource};

pub type StateId = usize;

/// Action run after a state is entered by consuming a symbol. Receives the
/// byte that was consumed; used by the type codecs to accumulate decoded
/// values. Kept as a boxed closure (rather than a tree-writing callback, per
/// Design Notes §9) so call sites can capture a concrete output buffer.
pub type Action = Rc<dyn Fn(u8)>;

/// A single node in a [`Dfa`]'s state graph.
#[derive(Clone)]
pub struct State {
    pub name: String,
    pub terminal: bool,
    /// Transitions on a specific byte value.
    transitions: HashMap<u8, StateId>,
    /// The `True` wildcard: matches any byte not covered by `transitions`.
    default_transition: Option<StateId>,
    /// Epsilon transitions, followed without consuming input, before a
    /// byte is matched against `transitions`/`default_transition`.
    epsilon: Vec<StateId>,
    /// Optional action invoked with the consumed byte when this state is
    /// *entered* via a byte-consuming transition (not via epsilon).
    action: Option<Action>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        State {
            name: name.into(),
            terminal: false,
            transitions: HashMap::new(),
            default_transition: None,
            epsilon: Vec::new(),
            action: None,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn on(mut self, byte: u8, target: StateId) -> Self {
        self.transitions.insert(byte, target);
        self
    }

    pub fn on_any(mut self, target: StateId) -> Self {
        self.default_transition = Some(target);
        self
    }

    pub fn epsilon_to(mut self, target: StateId) -> Self {
        self.epsilon.push(target);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

/// A DFA: an owned graph of [`State`]s plus a start state and grammar-level
/// flags.
#[derive(Clone)]
pub struct Dfa {
    pub name: String,
    states: Vec<State>,
    start: StateId,
    /// Whether this machine, as a whole, is allowed to report `terminal`.
    /// A `Dfa` evaluates terminal iff `terminal_flag && states[cursor].terminal`.
    pub terminal_flag: bool,
    /// Greedy machines continue consuming as long as any transition (in this
    /// machine or its enclosing machines, via a `Cursor`) exists; non-greedy
    /// machines stop on first entry to a terminal state.
    pub greedy: bool,
}

impl Dfa {
    pub fn new(name: impl Into<String>, states: Vec<State>, start: StateId) -> Self {
        Dfa {
            name: name.into(),
            states,
            start,
            terminal_flag: true,
            greedy: false,
        }
    }

    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn non_terminal(mut self) -> Self {
        self.terminal_flag = false;
        self
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id]
    }

    /// Follow epsilon transitions eagerly from `from`, returning the first
    /// state (possibly `from` itself) that either is terminal or has a real
    /// (byte-consuming) transition available. Epsilon chains in this engine
    /// are kept simple (no branching ambiguity) — the first epsilon target
    /// is the active resolution, matching the source's "enter a control
    /// state" semantics.
    fn resolve_epsilon(&self, from: StateId) -> StateId {
        let mut current = from;
        loop {
            let state = &self.states[current];
            if !state.transitions.is_empty() || state.default_transition.is_some() {
                return current;
            }
            match state.epsilon.first() {
                Some(&next) if next != current => current = next,
                _ => return current,
            }
        }
    }

    /// Whether `state` has any transition capable of consuming `byte`.
    fn can_consume(&self, state: StateId, byte: u8) -> bool {
        let resolved = self.resolve_epsilon(state);
        let s = &self.states[resolved];
        s.transitions.contains_key(&byte) || s.default_transition.is_some()
    }

    /// Attempt to consume `byte` from `state`, returning the resulting
    /// state id and invoking any entry action. `None` if no transition
    /// matches (the state's epsilon closure included).
    fn step(&self, state: StateId, byte: u8) -> Option<StateId> {
        let resolved = self.resolve_epsilon(state);
        let s = &self.states[resolved];
        let next = s
            .transitions
            .get(&byte)
            .copied()
            .or(s.default_transition)?;
        if let Some(action) = &self.states[next].action {
            action(byte);
        }
        Some(next)
    }

    pub fn is_terminal_state(&self, state: StateId) -> bool {
        self.states[self.resolve_epsilon(state)].terminal
    }
}

/// The outcome of offering one symbol to a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The symbol was consumed by the frame at `frame_index` (0 = outermost).
    Consumed { frame_index: usize },
    /// No frame in the stack had a transition for the symbol; the source
    /// position is left unchanged.
    Rejected,
}

/// A stack of active `(Dfa, state)` frames implementing DFA composition.
///
/// `run` drives the cursor to completion over a [`PeekableSource`]: the
/// innermost (top) frame is always offered the next symbol first; on
/// rejection each enclosing frame (searching from just-below-top outward)
/// is offered the same symbol. The first frame that accepts advances; all
/// others are left exactly as they were (this is the "inner machine paused,
/// outer machine borrows one symbol" reading of §4.1's enclosing-fallback
/// rule). A `push` onto the cursor models entering a sub-grammar; the
/// pushed frame is popped once it reports terminal and greedy continuation
/// is exhausted.
pub struct Cursor {
    stack: Vec<(Rc<Dfa>, StateId)>,
}

impl Cursor {
    pub fn new(dfa: Rc<Dfa>) -> Self {
        let start = dfa.start();
        Cursor {
            stack: vec![(dfa, start)],
        }
    }

    pub fn push(&mut self, dfa: Rc<Dfa>) {
        let start = dfa.start();
        self.stack.push((dfa, start));
    }

    /// Pop the innermost frame, returning it. Used once a sub-grammar has
    /// run to completion.
    pub fn pop(&mut self) -> Option<(Rc<Dfa>, StateId)> {
        self.stack.pop()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether the innermost frame is currently in a terminal state and
    /// flagged as a terminal-capable machine.
    pub fn is_terminal(&self) -> bool {
        match self.stack.last() {
            Some((dfa, state)) => dfa.terminal_flag && dfa.is_terminal_state(*state),
            None => false,
        }
    }

    /// Offer one symbol to the stack, innermost frame first.
    pub fn offer(&mut self, symbol: u8) -> StepOutcome {
        for idx in (0..self.stack.len()).rev() {
            let (dfa, state) = &self.stack[idx];
            if let Some(next) = dfa.step(*state, symbol) {
                self.stack[idx].1 = next;
                return StepOutcome::Consumed { frame_index: idx };
            }
        }
        StepOutcome::Rejected
    }

    /// Whether any frame (innermost first) could consume `symbol` right now,
    /// without actually consuming it. Used to implement greedy continuation:
    /// a greedy machine keeps running as long as *some* transition exists.
    pub fn can_offer(&self, symbol: u8) -> bool {
        self.stack
            .iter()
            .rev()
            .any(|(dfa, state)| dfa.can_consume(*state, symbol))
    }

    /// Drive the (innermost) machine over `source` until it cannot proceed:
    /// non-greedy machines stop on first entry to a terminal state; greedy
    /// machines continue as long as the next symbol is consumable anywhere
    /// in the stack, then stop at the first terminal state from which no
    /// further transition is possible. Returns the number of symbols
    /// consumed by the innermost machine's own transitions.
    pub fn run(&mut self, source: &mut dyn PeekableSource) -> usize {
        let mut consumed = 0usize;
        loop {
            if self.is_terminal() {
                let greedy = self.stack.last().map(|(d, _)| d.greedy).unwrap_or(false);
                if !greedy {
                    break;
                }
                match source.peek() {
                    Some(b) if self.can_offer(b) => {}
                    _ => break,
                }
            }
            let Some(symbol) = source.peek() else { break };
            match self.offer(symbol) {
                StepOutcome::Consumed { .. } => {
                    source.next();
                    consumed += 1;
                }
                StepOutcome::Rejected => break,
            }
        }
        consumed
    }
}

/// Run `dfa` to completion over `source`, returning whether it ended in an
/// accepting (terminal) state and how many bytes were consumed.
pub fn run_to_completion(dfa: Rc<Dfa>, source: &mut dyn PeekableSource) -> (bool, usize) {
    let mut cursor = Cursor::new(dfa);
    let consumed = cursor.run(source);
    (cursor.is_terminal(), consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a tiny non-greedy DFA that accepts exactly the two-byte
    /// sequence `b"ok"`.
    fn ok_dfa() -> Rc<Dfa> {
        let states = vec![
            State::new("start").on(b'o', 1),
            State::new("o").on(b'k', 2),
            State::new("ok").terminal(),
        ];
        Rc::new(Dfa::new("ok", states, 0))
    }

    #[test]
    fn non_greedy_stops_at_first_terminal() {
        let mut src = SliceSource::new(b"okXX");
        let (terminal, consumed) = run_to_completion(ok_dfa(), &mut src);
        assert!(terminal);
        assert_eq!(consumed, 2);
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn rejecting_symbol_does_not_advance_source() {
        let mut src = SliceSource::new(b"xy");
        let (terminal, consumed) = run_to_completion(ok_dfa(), &mut src);
        assert!(!terminal);
        assert_eq!(consumed, 0);
        assert_eq!(src.position(), 0);
    }

    /// A greedy DFA over the alphabet `{a}` (`a+`) consumes the longest run
    /// of `a`s, stopping only when the next symbol cannot be consumed.
    fn a_plus_dfa() -> Rc<Dfa> {
        let states = vec![
            State::new("start").on(b'a', 1),
            State::new("a").terminal().on(b'a', 1),
        ];
        Rc::new(Dfa::new("a+", states, 0).greedy(true))
    }

    #[test]
    fn greedy_consumes_longest_prefix() {
        let mut src = SliceSource::new(b"aaaab");
        let (terminal, consumed) = run_to_completion(a_plus_dfa(), &mut src);
        assert!(terminal);
        assert_eq!(consumed, 4);
        assert_eq!(src.next(), Some(b'b'));
    }

    #[test]
    fn composed_cursor_offers_outer_only_on_inner_rejection() {
        // Outer: consumes a leading ';' "delimiter" either side of an inner
        // `ok_dfa` run. Inner is pushed once outer sees the first ';'.
        let outer_states = vec![
            State::new("before").on(b';', 1),
            State::new("after-first-delim").terminal().on(b';', 2),
            State::new("after-second-delim").terminal(),
        ];
        let outer = Rc::new(Dfa::new("outer", outer_states, 0).greedy(true));
        let mut cursor = Cursor::new(outer.clone());
        let mut src = SliceSource::new(b";ok;");

        // First symbol ';' is consumed by outer directly (inner not pushed yet).
        assert_eq!(cursor.offer(src.next().unwrap()), StepOutcome::Consumed { frame_index: 0 });

        // Now push the inner "ok" grammar; it should claim 'o' and 'k'.
        cursor.push(ok_dfa());
        assert_eq!(cursor.offer(src.next().unwrap()), StepOutcome::Consumed { frame_index: 1 });
        assert_eq!(cursor.offer(src.next().unwrap()), StepOutcome::Consumed { frame_index: 1 });
        assert!(cursor.is_terminal());

        // Inner has nothing left to do; pop it and let outer consume the closing ';'.
        cursor.pop();
        assert_eq!(cursor.offer(src.next().unwrap()), StepOutcome::Consumed { frame_index: 0 });
        assert!(cursor.is_terminal());
    }
}
