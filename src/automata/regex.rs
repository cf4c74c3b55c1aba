//! Regex-to-DFA compilation.
//!
//! Patterns are parsed into an AST/HIR by `regex-syntax` — that crate is
//! used strictly as a parser here, never as a matcher. From the HIR this
//! module hand-builds a Thompson-construction NFA and then runs subset
//! construction to produce one of this crate's own [`Dfa`] graphs, so every
//! byte actually gets matched by `crate::automata`'s own state-stepping
//! code, not by the `regex` crate.
//!
//! Only the fragment of regex syntax the wire grammars in `crate::codec`
//! actually need is supported: literals, byte classes, concatenation,
//! alternation, `?`/`*`/`+`, and `{m,n}` repetition. Anchors, groups with
//! backreferences, and unicode-mode class semantics are out of scope —
//! `compile` returns an error for anything `regex-syntax` parses outside
//! byte semantics.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use regex_syntax::hir::{Class, Hir, HirKind, Literal, Repetition};
use regex_syntax::ParserBuilder;

use super::{Dfa, State};
use crate::error::{CipError, Result};

/// One Thompson-NFA state: either a byte-range transition to another NFA
/// state, or an epsilon edge (used for alternation/repetition wiring).
struct NfaState {
    /// (low, high, target) — an inclusive byte range transition.
    ranges: Vec<(u8, u8, usize)>,
    epsilons: Vec<usize>,
}

impl NfaState {
    fn new() -> Self {
        NfaState {
            ranges: Vec::new(),
            epsilons: Vec::new(),
        }
    }
}

/// A fragment of the NFA under construction: an entry state and a set of
/// "dangling" exit states still needing their onward transitions wired up.
struct Fragment {
    start: usize,
    ends: Vec<usize>,
}

struct NfaBuilder {
    states: Vec<NfaState>,
}

impl NfaBuilder {
    fn new() -> Self {
        NfaBuilder { states: Vec::new() }
    }

    fn push(&mut self) -> usize {
        self.states.push(NfaState::new());
        self.states.len() - 1
    }

    fn add_range(&mut self, from: usize, low: u8, high: u8, to: usize) {
        self.states[from].ranges.push((low, high, to));
    }

    fn add_epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilons.push(to);
    }

    /// Wire every dangling end of `frag` to `target` via epsilon.
    fn splice(&mut self, frag: &Fragment, target: usize) {
        for &end in &frag.ends {
            self.add_epsilon(end, target);
        }
    }

    fn literal_fragment(&mut self, byte: u8) -> Fragment {
        let start = self.push();
        let end = self.push();
        self.add_range(start, byte, byte, end);
        Fragment {
            start,
            ends: vec![end],
        }
    }

    fn class_fragment(&mut self, ranges: &[(u8, u8)]) -> Fragment {
        let start = self.push();
        let end = self.push();
        for &(low, high) in ranges {
            self.add_range(start, low, high, end);
        }
        Fragment {
            start,
            ends: vec![end],
        }
    }

    fn concat(&mut self, a: Fragment, b: Fragment) -> Fragment {
        self.splice(&a, b.start);
        Fragment {
            start: a.start,
            ends: b.ends,
        }
    }

    fn alternate(&mut self, branches: Vec<Fragment>) -> Fragment {
        let start = self.push();
        let mut ends = Vec::new();
        for branch in branches {
            self.add_epsilon(start, branch.start);
            ends.extend(branch.ends);
        }
        Fragment { start, ends }
    }

    fn optional(&mut self, inner: Fragment) -> Fragment {
        let start = self.push();
        self.add_epsilon(start, inner.start);
        let mut ends = inner.ends;
        ends.push(start);
        Fragment { start, ends }
    }

    fn star(&mut self, inner: Fragment) -> Fragment {
        let start = self.push();
        self.add_epsilon(start, inner.start);
        self.splice(&inner, start);
        Fragment {
            start,
            ends: vec![start],
        }
    }

    fn plus(&mut self, inner_build: impl Fn(&mut Self) -> Fragment) -> Fragment {
        let first = inner_build(self);
        let rest = self.star(inner_build(self));
        self.concat(first, rest)
    }

    fn epsilon_closure(&self, states: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut closure = states.clone();
        let mut stack: Vec<usize> = states.iter().copied().collect();
        while let Some(s) = stack.pop() {
            for &next in &self.states[s].epsilons {
                if closure.insert(next) {
                    stack.push(next);
                }
            }
        }
        closure
    }
}

fn hir_to_fragment(hir: &Hir, builder: &mut NfaBuilder) -> Result<Fragment> {
    match hir.kind() {
        HirKind::Literal(Literal(bytes)) => {
            let mut frags = bytes
                .iter()
                .map(|&b| builder.literal_fragment(b))
                .collect::<Vec<_>>();
            let mut acc = frags.remove(0);
            for f in frags {
                acc = builder.concat(acc, f);
            }
            Ok(acc)
        }
        HirKind::Class(Class::Bytes(class)) => {
            let ranges: Vec<(u8, u8)> = class
                .ranges()
                .iter()
                .map(|r| (r.start(), r.end()))
                .collect();
            Ok(builder.class_fragment(&ranges))
        }
        HirKind::Class(Class::Unicode(class)) => {
            // Restrict to the ASCII/byte-range subset; wire grammars never
            // need non-ASCII classes.
            let ranges: Vec<(u8, u8)> = class
                .ranges()
                .iter()
                .filter(|r| r.start() as u32 <= 0xFF)
                .map(|r| (r.start() as u8, (r.end() as u32).min(0xFF) as u8))
                .collect();
            if ranges.is_empty() {
                return Err(CipError::Configuration(
                    "unicode class has no byte-range representation".into(),
                ));
            }
            Ok(builder.class_fragment(&ranges))
        }
        HirKind::Concat(parts) => {
            let mut iter = parts.iter();
            let first = iter
                .next()
                .ok_or_else(|| CipError::Configuration("empty concatenation".into()))?;
            let mut acc = hir_to_fragment(first, builder)?;
            for part in iter {
                let next = hir_to_fragment(part, builder)?;
                acc = builder.concat(acc, next);
            }
            Ok(acc)
        }
        HirKind::Alternation(branches) => {
            let frags = branches
                .iter()
                .map(|b| hir_to_fragment(b, builder))
                .collect::<Result<Vec<_>>>()?;
            Ok(builder.alternate(frags))
        }
        HirKind::Repetition(Repetition {
            min, max, sub, ..
        }) => compile_repetition(sub, *min, *max, builder),
        HirKind::Empty => {
            let start = builder.push();
            Ok(Fragment {
                start,
                ends: vec![start],
            })
        }
        other => Err(CipError::Configuration(format!(
            "unsupported regex construct: {other:?}"
        ))),
    }
}

fn compile_repetition(
    sub: &Hir,
    min: u32,
    max: Option<u32>,
    builder: &mut NfaBuilder,
) -> Result<Fragment> {
    match (min, max) {
        (0, Some(1)) => {
            let inner = hir_to_fragment(sub, builder)?;
            Ok(builder.optional(inner))
        }
        (0, None) => {
            let inner = hir_to_fragment(sub, builder)?;
            Ok(builder.star(inner))
        }
        (1, None) => {
            let first = hir_to_fragment(sub, builder)?;
            let inner_again = hir_to_fragment(sub, builder)?;
            let rest = builder.star(inner_again);
            Ok(builder.concat(first, rest))
        }
        (m, None) => {
            // {m,} == m required copies followed by a star.
            let mut acc = hir_to_fragment(sub, builder)?;
            for _ in 1..m {
                let next = hir_to_fragment(sub, builder)?;
                acc = builder.concat(acc, next);
            }
            let tail = hir_to_fragment(sub, builder)?;
            let star = builder.star(tail);
            Ok(builder.concat(acc, star))
        }
        (m, Some(n)) => {
            // {m,n} == m required copies followed by (n - m) optional copies.
            let mut acc: Option<Fragment> = None;
            for _ in 0..m {
                let next = hir_to_fragment(sub, builder)?;
                acc = Some(match acc {
                    Some(prev) => builder.concat(prev, next),
                    None => next,
                });
            }
            for _ in m..n {
                let next = hir_to_fragment(sub, builder)?;
                let opt = builder.optional(next);
                acc = Some(match acc {
                    Some(prev) => builder.concat(prev, opt),
                    None => opt,
                });
            }
            acc.ok_or_else(|| CipError::Configuration("empty {0,0} repetition".into()))
        }
    }
}

/// Subset-construct a DFA from an NFA fragment, naming states `name_N` for
/// readability.
fn subset_construct(name: &str, builder: &NfaBuilder, frag: &Fragment) -> Dfa {
    let start_set = builder.epsilon_closure(&BTreeSet::from([frag.start]));
    let is_accept = |set: &BTreeSet<usize>| set.iter().any(|s| frag.ends.contains(s));

    let mut dfa_states: Vec<State> = Vec::new();
    let mut set_to_id: HashMap<BTreeSet<usize>, usize> = HashMap::new();
    let mut worklist: Vec<BTreeSet<usize>> = Vec::new();

    let start_id = dfa_states.len();
    dfa_states.push(State::new(format!("{name}_0")));
    set_to_id.insert(start_set.clone(), start_id);
    worklist.push(start_set.clone());
    if is_accept(&start_set) {
        dfa_states[start_id].terminal = true;
    }

    while let Some(set) = worklist.pop() {
        let from_id = set_to_id[&set];

        // Collect all byte boundaries among outgoing ranges of states in `set`.
        let mut boundaries: BTreeSet<u8> = BTreeSet::new();
        for &s in &set {
            for &(low, high, _) in &builder.states[s].ranges {
                boundaries.insert(low);
                if high < 255 {
                    boundaries.insert(high + 1);
                }
            }
        }
        let mut edges: Vec<u8> = boundaries.into_iter().collect();
        if edges.is_empty() {
            continue;
        }
        // Classify each sub-range [edges[i], edges[i+1]-1] (last one to 255).
        for i in 0..edges.len() {
            let low = edges[i];
            let high = if i + 1 < edges.len() {
                edges[i + 1] - 1
            } else {
                255
            };
            let mut targets: BTreeSet<usize> = BTreeSet::new();
            for &s in &set {
                for &(rlow, rhigh, target) in &builder.states[s].ranges {
                    if rlow <= low && high <= rhigh {
                        targets.insert(target);
                    }
                }
            }
            if targets.is_empty() {
                continue;
            }
            let closure = builder.epsilon_closure(&targets);
            let to_id = *set_to_id.entry(closure.clone()).or_insert_with(|| {
                let id = dfa_states.len();
                dfa_states.push(State::new(format!("{name}_{id}")));
                if is_accept(&closure) {
                    dfa_states[id].terminal = true;
                }
                worklist.push(closure.clone());
                id
            });
            for b in low..=high {
                dfa_states[from_id].transitions.insert(b, to_id);
                if b == 255 {
                    break;
                }
            }
        }
        let _ = edges.pop(); // silence unused warning if not consumed above
    }

    Dfa::new(name.to_string(), dfa_states, start_id)
}

/// Parse `pattern` as a byte-oriented regular expression and compile it
/// into a [`Dfa`]. `name` becomes the prefix of generated state names.
pub fn compile(name: &str, pattern: &str) -> Result<Rc<Dfa>> {
    let hir = ParserBuilder::new()
        .unicode(false)
        .utf8(false)
        .build()
        .parse(pattern)
        .map_err(|e| CipError::Configuration(format!("invalid pattern '{pattern}': {e}")))?;

    let mut builder = NfaBuilder::new();
    let frag = hir_to_fragment(&hir, &mut builder)?;
    Ok(Rc::new(subset_construct(name, &builder, &frag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::{run_to_completion, SliceSource};

    #[test]
    fn compiles_literal() {
        let dfa = compile("lit", "ok").unwrap();
        let mut src = SliceSource::new(b"ok!");
        let (terminal, consumed) = run_to_completion(dfa, &mut src);
        assert!(terminal);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn compiles_byte_class_alternation() {
        let dfa = compile("digit_or_x", "[0-9]|x").unwrap();
        let mut src = SliceSource::new(b"7");
        let (terminal, _) = run_to_completion(dfa.clone(), &mut src);
        assert!(terminal);

        let mut src = SliceSource::new(b"x");
        let (terminal, _) = run_to_completion(dfa, &mut src);
        assert!(terminal);
    }

    #[test]
    fn compiles_bounded_repetition() {
        let dfa = compile("two_to_three_a", "a{2,3}").unwrap();
        let mut src = SliceSource::new(b"aaaa");
        let (terminal, consumed) = run_to_completion(dfa, &mut src);
        assert!(terminal);
        assert!(consumed == 2 || consumed == 3);
    }
}
