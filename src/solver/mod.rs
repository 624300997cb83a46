//! The solution-node proof tree: lazy, restartable SLD search with
//! backtracking.
//!
//! Nodes live in an arena owned by the [`SolutionTree`] and reference each
//! other through [`NodeId`] handles, so the "deepest leaf" checkpoint is an
//! O(1) lookup with no ownership cycles. Every `next_solution` call, whether
//! it yields or fails, moves the per-node deepest-leaf pointers to wherever
//! the search bottomed out; chasing those pointers from the root gives the
//! resumption point for the next cycle.

use std::fmt;

use log::trace;

use crate::logic::{unify, Clause, Predicate, Rule, RuleSet, SubstitutionSet, VarGen};


/// Stable handle of a node in a [`SolutionTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum NodeKind {
    /// Atomic goal, resolved by scanning the rule set from a cursor.
    SimpleSentence {
        goal: Predicate,
        cursor: usize,
        child: Option<NodeId>,
    },
    /// Conjunction: the head node is built eagerly, the tail node is rebuilt
    /// for every head solution.
    And {
        head: NodeId,
        tail_clause: Clause,
        tail: Option<NodeId>,
    },
    /// Alternation: the left alternative is exhausted before the right node
    /// is built.
    Or {
        left: NodeId,
        right_clause: Clause,
        right: Option<NodeId>,
    },
    /// A goal against one rule: unify the head, then prove the body.
    Rule {
        goal: Predicate,
        rule: Rule,
        child: Option<NodeId>,
        head_yielded: bool,
    },
}

#[derive(Debug)]
struct Node {
    clause: Clause,
    parent_solution: SubstitutionSet,
    deepest_leaf: NodeId,
    exhausted: bool,
    kind: NodeKind,
}

/// A proof tree for one clause against one rule set.
///
/// Dropped children leave unreachable arena slots behind; the arena lives
/// only as long as its goal and is freed wholesale.
#[derive(Debug)]
pub struct SolutionTree {
    nodes: Vec<Node>,
    rules: RuleSet,
    root: NodeId,
    vars: VarGen,
    #[cfg(test)]
    visited: Vec<NodeId>,
}

impl SolutionTree {
    /// Build a tree proving `clause` under `parent` against `rules`.
    pub fn new(clause: Clause, rules: RuleSet, parent: SubstitutionSet) -> Self {
        let mut vars = VarGen::new();
        if let Some(max) = rules.max_var_id() {
            vars.seed_past(max);
        }
        if let Some(max) = clause.max_var_id() {
            vars.seed_past(max);
        }
        let mut tree = SolutionTree {
            nodes: Vec::new(),
            rules,
            root: NodeId(0),
            vars,
            #[cfg(test)]
            visited: Vec::new(),
        };
        tree.root = tree.alloc(clause, parent);
        tree
    }

    /// Build a tree proving the concrete `target` against one goal
    /// definition: the root unifies `target` with the definition's head and
    /// then proves its body.
    pub fn for_goal(target: Predicate, definition: Rule, rules: RuleSet) -> Self {
        let mut vars = VarGen::new();
        if let Some(max) = rules.max_var_id() {
            vars.seed_past(max);
        }
        if let Some(max) = target.max_var_id() {
            vars.seed_past(max);
        }
        if let Some(max) = definition.max_var_id() {
            vars.seed_past(max);
        }
        let mut tree = SolutionTree {
            nodes: Vec::new(),
            rules,
            root: NodeId(0),
            vars,
            #[cfg(test)]
            visited: Vec::new(),
        };
        let id = NodeId(0);
        tree.nodes.push(Node {
            clause: Clause::Rule(definition.clone()),
            parent_solution: SubstitutionSet::new(),
            deepest_leaf: id,
            exhausted: false,
            kind: NodeKind::Rule {
                goal: target,
                rule: definition,
                child: None,
                head_yielded: false,
            },
        });
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn clause(&self, id: NodeId) -> &Clause {
        &self.nodes[id.0].clause
    }

    /// The substitution the node inherited from its parent, recorded for
    /// resumption.
    pub fn parent_solution(&self, id: NodeId) -> &SubstitutionSet {
        &self.nodes[id.0].parent_solution
    }

    /// The current resumption checkpoint, chased transitively from the root.
    pub fn deepest_leaf(&self) -> NodeId {
        self.deepest_leaf_from(self.root)
    }

    pub fn deepest_leaf_from(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            let next = self.nodes[current.0].deepest_leaf;
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// If `id` is parked on an atomic sentence, directly or as the head of a
    /// stuck conjunction, return that sentence resolved through the recorded
    /// parent solution.
    pub fn stuck_sentence(&self, id: NodeId) -> Option<Predicate> {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::SimpleSentence { goal, .. } => Some(node.parent_solution.apply(goal)),
            NodeKind::And { head, .. } => {
                let head_node = &self.nodes[head.0];
                match &head_node.clause {
                    Clause::Fact(p) => Some(head_node.parent_solution.apply(p)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Next solution of the whole tree.
    pub fn next_solution(&mut self) -> Option<SubstitutionSet> {
        let root = self.root;
        self.solve(root)
    }

    /// Resume search at a checkpointed node.
    pub fn next_solution_at(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        self.solve(id)
    }

    /// Re-arm `id` for resumption: keep its recorded parent solution,
    /// install `rules` as the rule set in force, and drop its exploration
    /// state so the node rescans against the updated store.
    pub fn reset_node(&mut self, id: NodeId, rules: &RuleSet) {
        self.rules = rules.clone();
        if let Some(max) = self.rules.max_var_id() {
            self.vars.seed_past(max);
        }
        self.reset_in_place(id);
    }

    fn reset_in_place(&mut self, id: NodeId) {
        let parent = self.nodes[id.0].parent_solution.clone();
        let clause = self.nodes[id.0].clause.clone();
        self.nodes[id.0].exhausted = false;
        self.nodes[id.0].deepest_leaf = id;
        match clause {
            Clause::Fact(_) => {
                if let NodeKind::SimpleSentence { cursor, child, .. } = &mut self.nodes[id.0].kind {
                    *cursor = 0;
                    *child = None;
                }
            }
            Clause::And(h, _) => {
                let new_head = self.alloc(*h, parent);
                if let NodeKind::And { head, tail, .. } = &mut self.nodes[id.0].kind {
                    *head = new_head;
                    *tail = None;
                }
            }
            Clause::Or(l, _) => {
                let new_left = self.alloc(*l, parent);
                if let NodeKind::Or { left, right, .. } = &mut self.nodes[id.0].kind {
                    *left = new_left;
                    *right = None;
                }
            }
            Clause::Rule(_) => {
                if let NodeKind::Rule {
                    child, head_yielded, ..
                } = &mut self.nodes[id.0].kind
                {
                    *child = None;
                    *head_yielded = false;
                }
            }
        }
    }

    fn alloc(&mut self, clause: Clause, parent: SubstitutionSet) -> NodeId {
        let kind = match &clause {
            Clause::Fact(p) => NodeKind::SimpleSentence {
                goal: p.clone(),
                cursor: 0,
                child: None,
            },
            Clause::And(h, t) => {
                let head = self.alloc((**h).clone(), parent.clone());
                NodeKind::And {
                    head,
                    tail_clause: (**t).clone(),
                    tail: None,
                }
            }
            Clause::Or(l, r) => {
                let left = self.alloc((**l).clone(), parent.clone());
                NodeKind::Or {
                    left,
                    right_clause: (**r).clone(),
                    right: None,
                }
            }
            Clause::Rule(rule) => NodeKind::Rule {
                goal: rule.head.clone(),
                rule: rule.clone(),
                child: None,
                head_yielded: false,
            },
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            clause,
            parent_solution: parent,
            deepest_leaf: id,
            exhausted: false,
            kind,
        });
        id
    }

    fn solve(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        #[cfg(test)]
        self.visited.push(id);
        if self.nodes[id.0].exhausted {
            return None;
        }
        let result = match self.nodes[id.0].kind {
            NodeKind::SimpleSentence { .. } => self.solve_simple(id),
            NodeKind::And { .. } => self.solve_and(id),
            NodeKind::Or { .. } => self.solve_or(id),
            NodeKind::Rule { .. } => self.solve_rule(id),
        };
        if result.is_none() {
            self.nodes[id.0].exhausted = true;
        }
        result
    }

    /// Scan the rule set for heads unifying with the goal. Facts yield the
    /// unifier directly; rules with a body delegate to the body's node under
    /// the unifier. The cursor lets repeated calls resume the scan.
    fn solve_simple(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        // resume an in-progress body proof first
        if let NodeKind::SimpleSentence {
            child: Some(child), ..
        } = self.nodes[id.0].kind
        {
            if let Some(solution) = self.solve(child) {
                self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(child);
                return Some(solution);
            }
            if let NodeKind::SimpleSentence { child, .. } = &mut self.nodes[id.0].kind {
                *child = None;
            }
        }
        loop {
            let (goal, cursor) = match &self.nodes[id.0].kind {
                NodeKind::SimpleSentence { goal, cursor, .. } => (goal.clone(), *cursor),
                _ => unreachable!("solve_simple on a non-sentence node"),
            };
            let Some(rule) = self.rules.get(cursor).cloned() else {
                self.nodes[id.0].deepest_leaf = id;
                return None;
            };
            if let NodeKind::SimpleSentence { cursor, .. } = &mut self.nodes[id.0].kind {
                *cursor += 1;
            }
            let rule = rule.standardized_apart(&mut self.vars);
            let parent = self.nodes[id.0].parent_solution.clone();
            let Some(solution) = unify(&goal, &rule.head, &parent) else {
                continue;
            };
            trace!("sentence {} matches head of {}", goal, rule);
            match rule.body {
                None => {
                    self.nodes[id.0].deepest_leaf = id;
                    return Some(solution);
                }
                Some(body) => {
                    let child = self.alloc(*body, solution);
                    if let NodeKind::SimpleSentence { child: c, .. } = &mut self.nodes[id.0].kind {
                        *c = Some(child);
                    }
                    if let Some(solution) = self.solve(child) {
                        self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(child);
                        return Some(solution);
                    }
                    // body unprovable for this candidate, keep scanning
                    if let NodeKind::SimpleSentence { child: c, .. } = &mut self.nodes[id.0].kind {
                        *c = None;
                    }
                }
            }
        }
    }

    /// Conjunction search. Retries the existing tail first so the tail is
    /// backtracked in full without re-deriving the head, then pulls head
    /// alternatives, seeding a fresh tail node with each head solution. The
    /// node marks itself as the deepest leaf only when the head produced
    /// nothing at all during the call: the search is stuck here, not deeper.
    fn solve_and(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        if let NodeKind::And {
            tail: Some(tail), ..
        } = self.nodes[id.0].kind
        {
            if let Some(solution) = self.solve(tail) {
                self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(tail);
                return Some(solution);
            }
        }
        let mut entered = false;
        loop {
            let head = match &self.nodes[id.0].kind {
                NodeKind::And { head, .. } => *head,
                _ => unreachable!("solve_and on a non-and node"),
            };
            let Some(head_solution) = self.solve(head) else {
                break;
            };
            entered = true;
            let tail_clause = match &self.nodes[id.0].kind {
                NodeKind::And { tail_clause, .. } => tail_clause.clone(),
                _ => unreachable!(),
            };
            let tail = self.alloc(tail_clause, head_solution);
            if let NodeKind::And { tail: t, .. } = &mut self.nodes[id.0].kind {
                *t = Some(tail);
            }
            let tail_solution = self.solve(tail);
            self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(tail);
            if tail_solution.is_some() {
                return tail_solution;
            }
        }
        if !entered {
            self.nodes[id.0].deepest_leaf = id;
        }
        None
    }

    /// Alternation: left alternative in full, then the right.
    fn solve_or(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        let left = match &self.nodes[id.0].kind {
            NodeKind::Or { left, .. } => *left,
            _ => unreachable!("solve_or on a non-or node"),
        };
        if let Some(solution) = self.solve(left) {
            self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(left);
            return Some(solution);
        }
        let (existing, right_clause) = match &self.nodes[id.0].kind {
            NodeKind::Or {
                right, right_clause, ..
            } => (*right, right_clause.clone()),
            _ => unreachable!(),
        };
        let right = match existing {
            Some(r) => r,
            None => {
                let parent = self.nodes[id.0].parent_solution.clone();
                let r = self.alloc(right_clause, parent);
                if let NodeKind::Or { right, .. } = &mut self.nodes[id.0].kind {
                    *right = Some(r);
                }
                r
            }
        };
        if let Some(solution) = self.solve(right) {
            self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(right);
            return Some(solution);
        }
        self.nodes[id.0].deepest_leaf = id;
        None
    }

    /// One rule: unify the goal against the (standardized-apart) head. A
    /// bodyless rule yields the unifier exactly once; a rule with a body
    /// delegates enumeration to the body's node under the unifier.
    fn solve_rule(&mut self, id: NodeId) -> Option<SubstitutionSet> {
        if let NodeKind::Rule {
            child: Some(child), ..
        } = self.nodes[id.0].kind
        {
            let solution = self.solve(child);
            self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(child);
            return solution;
        }
        let (goal, rule, head_yielded) = match &self.nodes[id.0].kind {
            NodeKind::Rule {
                goal,
                rule,
                head_yielded,
                ..
            } => (goal.clone(), rule.clone(), *head_yielded),
            _ => unreachable!("solve_rule on a non-rule node"),
        };
        if head_yielded {
            self.nodes[id.0].deepest_leaf = id;
            return None;
        }
        let rule = rule.standardized_apart(&mut self.vars);
        let parent = self.nodes[id.0].parent_solution.clone();
        let Some(solution) = unify(&goal, &rule.head, &parent) else {
            self.nodes[id.0].deepest_leaf = id;
            return None;
        };
        if let NodeKind::Rule { head_yielded, .. } = &mut self.nodes[id.0].kind {
            *head_yielded = true;
        }
        trace!("goal {} matches definition head of {}", goal, rule);
        match rule.body {
            None => {
                self.nodes[id.0].deepest_leaf = id;
                Some(solution)
            }
            Some(body) => {
                let child = self.alloc(*body, solution);
                if let NodeKind::Rule { child: c, .. } = &mut self.nodes[id.0].kind {
                    *c = Some(child);
                }
                let solution = self.solve(child);
                self.nodes[id.0].deepest_leaf = self.deepest_leaf_from(child);
                solution
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn visit_log(&self) -> &[NodeId] {
        &self.visited
    }

    #[cfg(test)]
    pub(crate) fn clear_visit_log(&mut self) {
        self.visited.clear();
    }
}

impl fmt::Display for SolutionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leaf = self.deepest_leaf();
        write!(
            f,
            "[{}] => [{}]",
            self.nodes[self.root.0].clause, self.nodes[leaf.0].clause
        )
    }
}
