// automaton.rs — Finite automata over signature characters.
//
// A compiled SRE carries up to two automata (positive and negative). Each is
// an epsilon-NFA whose edges are labelled with character classes:
//
//   Just(c)          exactly the character c
//   Any              any character
//   AnyExcept(set)   any character not in set
//
// The classes are closed under intersection, which is all the product
// construction needs. Union is a fresh start state with epsilon edges into
// both operands. Membership is a plain subset simulation.
//
// There is no determinization or minimization: policy patterns are short and
// the engine only ever asks "does this automaton accept this signature".

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::pattern::PatternToken;
use crate::signature::Shape;

/// An edge label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharClass {
    Just(char),
    Any,
    AnyExcept(BTreeSet<char>),
}

impl CharClass {
    pub fn matches(&self, c: char) -> bool {
        match self {
            CharClass::Just(x) => *x == c,
            CharClass::Any => true,
            CharClass::AnyExcept(set) => !set.contains(&c),
        }
    }

    /// The class of characters matched by both labels, if any.
    pub fn intersect(&self, other: &CharClass) -> Option<CharClass> {
        use CharClass::*;
        match (self, other) {
            (Just(a), Just(b)) => (a == b).then(|| Just(*a)),
            (Just(a), Any) | (Any, Just(a)) => Some(Just(*a)),
            (Just(a), AnyExcept(set)) | (AnyExcept(set), Just(a)) => {
                (!set.contains(a)).then(|| Just(*a))
            }
            (Any, Any) => Some(Any),
            (Any, AnyExcept(set)) | (AnyExcept(set), Any) => Some(AnyExcept(set.clone())),
            (AnyExcept(s), AnyExcept(t)) => Some(AnyExcept(s.union(t).copied().collect())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct State {
    accepting: bool,
    epsilon: Vec<usize>,
    edges: Vec<(CharClass, usize)>,
}

/// An epsilon-NFA accepting a language of signature strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    states: Vec<State>,
    start: usize,
}

impl Automaton {
    /// The automaton accepting nothing.
    pub fn empty() -> Self {
        Self {
            states: vec![State::default()],
            start: 0,
        }
    }

    /// The automaton accepting every string.
    pub fn universal() -> Self {
        Self {
            states: vec![State {
                accepting: true,
                epsilon: Vec::new(),
                edges: vec![(CharClass::Any, 0)],
            }],
            start: 0,
        }
    }

    /// Accept exactly `text`.
    pub fn literal(text: &str) -> Self {
        let tokens: Vec<PatternToken> = text.chars().map(PatternToken::Char).collect();
        Self::from_tokens(&tokens)
    }

    /// Build from a tokenized pattern. `AnyRun` becomes a self-loop on the
    /// current state, so consecutive wildcards collapse naturally.
    pub fn from_tokens(tokens: &[PatternToken]) -> Self {
        let mut states = vec![State::default()];
        let mut current = 0;
        for token in tokens {
            match token {
                PatternToken::Char(c) => {
                    states.push(State::default());
                    let next = states.len() - 1;
                    states[current].edges.push((CharClass::Just(*c), next));
                    current = next;
                }
                PatternToken::AnyRun => {
                    if !states[current]
                        .edges
                        .iter()
                        .any(|(class, to)| *to == current && *class == CharClass::Any)
                    {
                        states[current].edges.push((CharClass::Any, current));
                    }
                }
            }
        }
        states[current].accepting = true;
        Self { states, start: 0 }
    }

    /// Accept every string of the given shape: result literals start with
    /// `#`, actions are non-empty and do not.
    pub fn shaped(shape: Shape) -> Self {
        let first = match shape {
            Shape::Result => CharClass::Just('#'),
            Shape::Action => CharClass::AnyExcept(BTreeSet::from(['#'])),
        };
        Self {
            states: vec![
                State {
                    accepting: false,
                    epsilon: Vec::new(),
                    edges: vec![(first, 1)],
                },
                State {
                    accepting: true,
                    epsilon: Vec::new(),
                    edges: vec![(CharClass::Any, 1)],
                },
            ],
            start: 0,
        }
    }

    /// Language union.
    pub fn union(&self, other: &Automaton) -> Automaton {
        let mut states = Vec::with_capacity(self.states.len() + other.states.len() + 1);
        states.push(State::default());
        let left = append_shifted(&mut states, self);
        let right = append_shifted(&mut states, other);
        states[0].epsilon = vec![left, right];
        Automaton { states, start: 0 }
    }

    /// Language intersection, by reachable product construction.
    pub fn intersect(&self, other: &Automaton) -> Automaton {
        let mut product = Product {
            left: self,
            right: other,
            index: HashMap::new(),
            states: Vec::new(),
            queue: VecDeque::new(),
        };

        let start = product.intern(self.start, other.start);
        while let Some((p, q, from)) = product.queue.pop_front() {
            let (ps, qs) = (&self.states[p], &other.states[q]);

            for &p2 in &ps.epsilon {
                let to = product.intern(p2, q);
                product.states[from].epsilon.push(to);
            }
            for &q2 in &qs.epsilon {
                let to = product.intern(p, q2);
                product.states[from].epsilon.push(to);
            }
            for (left_class, p2) in &ps.edges {
                for (right_class, q2) in &qs.edges {
                    if let Some(class) = left_class.intersect(right_class) {
                        let to = product.intern(*p2, *q2);
                        product.states[from].edges.push((class, to));
                    }
                }
            }
        }

        Automaton {
            states: product.states,
            start,
        }
    }

    /// Membership test by subset simulation.
    pub fn accepts(&self, input: &str) -> bool {
        let mut current = self.closure(vec![self.start]);
        for c in input.chars() {
            let targets: Vec<usize> = current
                .iter()
                .flat_map(|&s| self.states[s].edges.iter())
                .filter(|(class, _)| class.matches(c))
                .map(|(_, to)| *to)
                .collect();
            if targets.is_empty() {
                return false;
            }
            current = self.closure(targets);
        }
        current.iter().any(|&s| self.states[s].accepting)
    }

    /// Whether no string is accepted. Every edge class is satisfiable, so
    /// this is plain reachability of an accepting state.
    pub fn is_empty(&self) -> bool {
        let mut seen = vec![false; self.states.len()];
        let mut stack = vec![self.start];
        while let Some(s) = stack.pop() {
            if std::mem::replace(&mut seen[s], true) {
                continue;
            }
            let state = &self.states[s];
            if state.accepting {
                return false;
            }
            stack.extend(state.epsilon.iter().copied());
            stack.extend(state.edges.iter().map(|(_, to)| *to));
        }
        true
    }

    fn closure(&self, seeds: Vec<usize>) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        let mut stack = seeds;
        while let Some(s) = stack.pop() {
            if set.insert(s) {
                stack.extend(self.states[s].epsilon.iter().copied());
            }
        }
        set
    }
}

/// Work state of one product construction.
struct Product<'a> {
    left: &'a Automaton,
    right: &'a Automaton,
    index: HashMap<(usize, usize), usize>,
    states: Vec<State>,
    queue: VecDeque<(usize, usize, usize)>,
}

impl Product<'_> {
    /// Id of the product state for `(p, q)`, creating and enqueueing it on
    /// first sight.
    fn intern(&mut self, p: usize, q: usize) -> usize {
        if let Some(&id) = self.index.get(&(p, q)) {
            return id;
        }
        let id = self.states.len();
        self.states.push(State {
            accepting: self.left.states[p].accepting && self.right.states[q].accepting,
            ..State::default()
        });
        self.index.insert((p, q), id);
        self.queue.push_back((p, q, id));
        id
    }
}

/// Copy `automaton`'s states onto the end of `states`, rebasing indices.
/// Returns the new index of its start state.
fn append_shifted(states: &mut Vec<State>, automaton: &Automaton) -> usize {
    let offset = states.len();
    states.extend(automaton.states.iter().map(|s| State {
        accepting: s.accepting,
        epsilon: s.epsilon.iter().map(|e| e + offset).collect(),
        edges: s
            .edges
            .iter()
            .map(|(class, to)| (class.clone(), to + offset))
            .collect(),
    }));
    automaton.start + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::tokenize;

    fn pattern(text: &str) -> Automaton {
        Automaton::from_tokens(&tokenize(text))
    }

    #[test]
    fn literal_accepts_only_itself() {
        let a = Automaton::literal("pkg.Foo.bar()");
        assert!(a.accepts("pkg.Foo.bar()"));
        assert!(!a.accepts("pkg.Foo.bar(int)"));
        assert!(!a.accepts("pkg.Foo.bar"));
        assert!(!a.accepts(""));
    }

    #[test]
    fn wildcard_matches_any_run() {
        let a = pattern("pkg.Foo.%(%)");
        assert!(a.accepts("pkg.Foo.bar()"));
        assert!(a.accepts("pkg.Foo.baz(int,String)"));
        assert!(!a.accepts("pkg.Bar.baz()"));
    }

    #[test]
    fn union_accepts_either_language() {
        let a = Automaton::literal("a.m()").union(&Automaton::literal("b.m()"));
        assert!(a.accepts("a.m()"));
        assert!(a.accepts("b.m()"));
        assert!(!a.accepts("c.m()"));
    }

    #[test]
    fn intersection_accepts_both_languages_only() {
        let a = pattern("pkg.%()").intersect(&pattern("%.Foo.bar()"));
        assert!(a.accepts("pkg.Foo.bar()"));
        assert!(!a.accepts("pkg.Foo.baz()"));
        assert!(!a.accepts("other.Foo.bar()"));
    }

    #[test]
    fn intersection_through_union_epsilons() {
        let left = Automaton::literal("a.m()").union(&Automaton::literal("b.m()"));
        let right = pattern("b.%");
        let both = left.intersect(&right);
        assert!(both.accepts("b.m()"));
        assert!(!both.accepts("a.m()"));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = Automaton::literal("a.m()").intersect(&Automaton::literal("b.m()"));
        assert!(a.is_empty());
        assert!(!Automaton::universal().is_empty());
        assert!(Automaton::empty().is_empty());
    }

    #[test]
    fn shape_automata_split_actions_from_results() {
        let actions = Automaton::shaped(Shape::Action);
        let results = Automaton::shaped(Shape::Result);
        assert!(actions.accepts("pkg.Foo.bar()"));
        assert!(!actions.accepts("#int{1}"));
        assert!(results.accepts("#int{1}"));
        assert!(!results.accepts("pkg.Foo.bar()"));

        let only_actions = Automaton::universal().intersect(&actions);
        assert!(only_actions.accepts("x()"));
        assert!(!only_actions.accepts("#String{x}"));
    }

    #[test]
    fn char_class_intersection() {
        let except_hash = CharClass::AnyExcept(BTreeSet::from(['#']));
        assert_eq!(CharClass::Just('#').intersect(&except_hash), None);
        assert_eq!(
            CharClass::Just('a').intersect(&except_hash),
            Some(CharClass::Just('a'))
        );
        assert_eq!(
            except_hash.intersect(&CharClass::AnyExcept(BTreeSet::from(['$']))),
            Some(CharClass::AnyExcept(BTreeSet::from(['#', '$'])))
        );
    }
}
