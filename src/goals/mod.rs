//! Goal templates and the cross-cycle goal-persistence layer.
//!
//! A goal is re-attempted every cycle from its checkpointed deepest leaf
//! rather than from scratch. When the current proof attempt bottoms out on a
//! pending action the goal parks there; when it bottoms out anywhere else
//! the next alternative definition is tried within the same cycle, and once
//! all alternatives are exhausted the goal resets and waits for new facts.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::logic::{Clause, Predicate, Rule, RuleSet, SubstitutionSet};
use crate::solver::SolutionTree;

#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("no goal template registered for {0}")]
    UnknownTemplate(Predicate),
    #[error("goal template {0} has no definitions")]
    EmptyTemplate(String),
}

/// A named, reusable goal with an ordered list of alternative definitions.
/// Each definition is a rule whose head is unified with the concrete target
/// when the goal is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTemplate {
    pub name: String,
    pub definitions: Vec<Rule>,
}

impl GoalTemplate {
    pub fn new(name: impl Into<String>, definitions: Vec<Rule>) -> Self {
        GoalTemplate {
            name: name.into(),
            definitions,
        }
    }
}

/// Registry of goal templates, looked up by target predicate name.
#[derive(Debug, Clone, Default)]
pub struct GoalSet {
    templates: HashMap<String, GoalTemplate>,
}

impl GoalSet {
    pub fn new() -> Self {
        GoalSet::default()
    }

    pub fn add_template(&mut self, template: GoalTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn lookup_template(&self, name: &str) -> Option<&GoalTemplate> {
        self.templates.get(name)
    }
}

/// A goal template bound to a concrete target predicate, with a cursor over
/// the template's alternative definitions.
#[derive(Debug, Clone)]
pub struct Goal {
    target: Predicate,
    definitions: Vec<Rule>,
    cursor: usize,
}

impl Goal {
    fn new(template: &GoalTemplate, target: Predicate) -> Self {
        Goal {
            target,
            definitions: template.definitions.clone(),
            cursor: 0,
        }
    }

    pub fn target(&self) -> &Predicate {
        &self.target
    }

    fn alternative_count(&self) -> usize {
        self.definitions.len()
    }

    fn has_next_definition(&self) -> bool {
        self.cursor < self.definitions.len()
    }

    /// The next alternative definition, advancing the cursor.
    fn next_definition(&mut self) -> Option<Rule> {
        let definition = self.definitions.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(definition)
    }

    /// Back to the first alternative.
    fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)
    }
}

fn queue_event(next_events: &mut RuleSet, event: Predicate) {
    if !next_events.contains_unifying_fact(&event) {
        next_events.add_rule(Rule::fact(event));
    }
}

/// The pending goals and their persisted proof trees, plus the next-cycle
/// events accumulated while solving them.
pub struct GoalsList {
    definitions: GoalSet,
    goals: Vec<(Goal, SolutionTree)>,
    next_events: RuleSet,
}

impl GoalsList {
    pub fn new(definitions: GoalSet) -> Self {
        GoalsList {
            definitions,
            goals: Vec::new(),
            next_events: RuleSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn next_events(&self) -> &RuleSet {
        &self.next_events
    }

    /// Queue an event for the next cycle unless an equivalent one is
    /// already queued.
    pub fn add_next_event(&mut self, event: Predicate) {
        queue_event(&mut self.next_events, event);
    }

    /// Bind `target` to its goal template, build the proof tree for the
    /// template's first alternative, and register the goal.
    pub fn add_goal(&mut self, target: Predicate, rules: &RuleSet) -> Result<(), GoalError> {
        let template = self
            .definitions
            .lookup_template(&target.name)
            .ok_or_else(|| GoalError::UnknownTemplate(target.clone()))?;
        let mut goal = Goal::new(template, target);
        let definition = goal
            .next_definition()
            .ok_or_else(|| GoalError::EmptyTemplate(goal.target.name.clone()))?;
        let tree = SolutionTree::for_goal(goal.target.clone(), definition, rules.clone());
        self.goals.push((goal, tree));
        Ok(())
    }

    /// One attempt at one goal. Resumes from the checkpointed deepest leaf;
    /// on exhaustion either parks on a pending action, switches to the next
    /// alternative definition within the same cycle, or resets to wait for
    /// the next cycle. Returns true when the goal is solved.
    fn solve_goal(
        goal: &mut Goal,
        tree: &mut SolutionTree,
        rules: &RuleSet,
        db: &Database,
        next_events: &mut RuleSet,
    ) -> bool {
        // bounded alternative retry: each pass resumes the current
        // definition or moves to the next one
        for _ in 0..=goal.alternative_count() {
            let leaf = tree.deepest_leaf();
            tree.reset_node(leaf, rules);
            if tree.next_solution_at(leaf).is_some() {
                debug!("goal {} solved", goal);
                return true;
            }

            // the attempt may have bottomed out deeper than the old leaf
            let leaf = tree.deepest_leaf();
            if let Some(sentence) = tree.stuck_sentence(leaf) {
                if let Some(action) = db.lookup_action(&sentence.name) {
                    if action.is_admissible(&sentence, rules, next_events) {
                        debug!("goal {}: scheduling action {}", goal, sentence);
                        queue_event(next_events, sentence);
                    }
                    // parked on the pending action either way
                    return false;
                }
            }

            if goal.has_next_definition() {
                let definition = goal.next_definition().expect("cursor checked");
                trace!("goal {}: switching to next definition", goal);
                *tree = SolutionTree::for_goal(goal.target.clone(), definition, rules.clone());
                continue;
            }

            // no alternative left: rebuild from the first definition and
            // wait for the next cycle
            goal.reset();
            let definition = goal
                .next_definition()
                .expect("registered goals have at least one definition");
            *tree = SolutionTree::for_goal(goal.target.clone(), definition, rules.clone());
            return false;
        }
        false
    }

    /// Solve every pending goal against the database plus this cycle's
    /// events, dropping the goals that succeed. Returns the actions chosen
    /// for the next cycle.
    pub fn solve_goals(&mut self, events: &RuleSet, db: &Database) -> RuleSet {
        let mut rules = db.rule_set();
        rules.extend(events);

        let GoalsList {
            goals, next_events, ..
        } = self;
        goals.retain_mut(|(goal, tree)| !Self::solve_goal(goal, tree, &rules, db, next_events));

        std::mem::take(next_events)
    }

    /// Serializable view of the pending goals for fixtures and snapshot
    /// comparison.
    pub fn snapshot(&self) -> GoalsState {
        GoalsState {
            goals: self
                .goals
                .iter()
                .map(|(goal, tree)| {
                    let leaf = tree.deepest_leaf();
                    GoalStateEntry {
                        target: goal.target.clone(),
                        definition: tree.clause(tree.root()).clone(),
                        deepest_leaf: tree.clause(leaf).clone(),
                        pending_substitution: tree.parent_solution(leaf).clone(),
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for GoalsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for (goal, tree) in &self.goals {
            writeln!(f, "[{}] {}", goal, tree)?;
        }
        write!(f, "}}")
    }
}

/// One pending goal: its target, the definition being attempted, where the
/// search is checkpointed, and the substitution the checkpoint will resume
/// under.
#[derive(Debug, Clone, Serialize)]
pub struct GoalStateEntry {
    pub target: Predicate,
    pub definition: Clause,
    pub deepest_leaf: Clause,
    pub pending_substitution: SubstitutionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalsState {
    pub goals: Vec<GoalStateEntry>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Action, PostDeclaration};
    use crate::logic::Term;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ground(name: &str, args: &[&str]) -> Predicate {
        Predicate::new(name, args.iter().map(|a| Term::constant(*a)).collect())
    }

    fn open(name: &str, vars: &[(&str, usize)]) -> Predicate {
        Predicate::new(name, vars.iter().map(|(n, id)| Term::var(*n, *id)).collect())
    }

    struct AlwaysAdmissible(&'static str);

    impl Action for AlwaysAdmissible {
        fn name(&self) -> &str {
            self.0
        }

        fn is_admissible(&self, _: &Predicate, _: &RuleSet, _: &RuleSet) -> bool {
            true
        }
    }

    struct NeverAdmissible(&'static str);

    impl Action for NeverAdmissible {
        fn name(&self) -> &str {
            self.0
        }

        fn is_admissible(&self, _: &Predicate, _: &RuleSet, _: &RuleSet) -> bool {
            false
        }
    }

    #[test]
    fn add_goal_requires_a_template() {
        let mut list = GoalsList::new(GoalSet::new());
        let err = list
            .add_goal(ground("explore", &[]), &RuleSet::new())
            .unwrap_err();
        assert!(matches!(err, GoalError::UnknownTemplate(_)));
    }

    #[test]
    fn solved_goal_is_removed() {
        init_logs();
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "reach",
            vec![Rule::new(
                open("reach", &[("T", 0)]),
                Clause::Fact(open("at", &[("T", 0)])),
            )],
        ));
        let mut db = Database::new();
        db.add_fact(ground("at", &["door"]));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("reach", &["door"]), &db.rule_set())
            .unwrap();
        assert_eq!(list.len(), 1);

        let next = list.solve_goals(&RuleSet::new(), &db);
        assert!(list.is_empty());
        assert!(next.is_empty());
    }

    #[test]
    fn exhausted_first_definition_switches_within_the_cycle() {
        init_logs();
        // definition 1 depends on a predicate with no support; definition 2
        // succeeds immediately
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "reach",
            vec![
                Rule::new(
                    open("reach", &[("T", 0)]),
                    Clause::Fact(open("teleport_to", &[("T", 0)])),
                ),
                Rule::new(
                    open("reach", &[("T", 0)]),
                    Clause::Fact(open("at", &[("T", 0)])),
                ),
            ],
        ));
        let mut db = Database::new();
        db.add_fact(ground("at", &["door"]));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("reach", &["door"]), &db.rule_set())
            .unwrap();
        list.solve_goals(&RuleSet::new(), &db);
        assert!(list.is_empty(), "second definition must solve the goal");
    }

    #[test]
    fn exhausted_goal_resets_and_stays_pending() {
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "reach",
            vec![Rule::new(
                open("reach", &[("T", 0)]),
                Clause::Fact(open("at", &[("T", 0)])),
            )],
        ));
        let db = Database::new();

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("reach", &["door"]), &db.rule_set())
            .unwrap();
        list.solve_goals(&RuleSet::new(), &db);
        assert_eq!(list.len(), 1, "unsolvable goal stays pending");

        // the goal is rebuilt on its first definition, ready for next cycle
        let snapshot = list.snapshot();
        assert_eq!(snapshot.goals[0].target, ground("reach", &["door"]));
        assert_eq!(snapshot.goals[0].definition, snapshot.goals[0].deepest_leaf);
    }

    #[test]
    fn admissible_action_is_queued_and_goal_parks() {
        init_logs();
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "fetch",
            vec![Rule::new(
                open("fetch", &[("T", 0)]),
                Clause::Fact(open("grab", &[("T", 0)])),
            )],
        ));
        let mut db = Database::new();
        db.register_action(Box::new(AlwaysAdmissible("grab")));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("fetch", &["box1"]), &db.rule_set())
            .unwrap();
        let next = list.solve_goals(&RuleSet::new(), &db);

        assert_eq!(list.len(), 1, "goal parks on the pending action");
        assert_eq!(next.len(), 1);
        assert_eq!(next.get(0).unwrap().head, ground("grab", &["box1"]));
    }

    #[test]
    fn inadmissible_action_queues_nothing() {
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "fetch",
            vec![Rule::new(
                open("fetch", &[("T", 0)]),
                Clause::Fact(open("grab", &[("T", 0)])),
            )],
        ));
        let mut db = Database::new();
        db.register_action(Box::new(NeverAdmissible("grab")));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("fetch", &["box1"]), &db.rule_set())
            .unwrap();
        let next = list.solve_goals(&RuleSet::new(), &db);

        assert_eq!(list.len(), 1);
        assert!(next.is_empty(), "inadmissible action must not be queued");
    }

    #[test]
    fn stuck_conjunction_head_parks_on_action() {
        // task(T) :- pick(T), done(T): pick is an action, nothing supports
        // it yet, so the goal parks with pick(box1) queued
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "task",
            vec![Rule::new(
                open("task", &[("T", 0)]),
                Clause::and(
                    Clause::Fact(open("pick", &[("T", 0)])),
                    Clause::Fact(open("done", &[("T", 0)])),
                ),
            )],
        ));
        let mut db = Database::new();
        db.register_action(Box::new(AlwaysAdmissible("pick")));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("task", &["box1"]), &db.rule_set())
            .unwrap();
        let next = list.solve_goals(&RuleSet::new(), &db);

        assert_eq!(list.len(), 1);
        assert_eq!(next.get(0).unwrap().head, ground("pick", &["box1"]));
    }

    #[test]
    fn next_events_deduplicate_by_unification() {
        let mut list = GoalsList::new(GoalSet::new());
        list.add_next_event(ground("grab", &["box1"]));
        list.add_next_event(ground("grab", &["box1"]));
        list.add_next_event(ground("grab", &["box2"]));
        assert_eq!(list.next_events().len(), 2);
    }

    #[test]
    fn snapshot_serializes_the_pending_goal_state() {
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "task",
            vec![Rule::new(
                open("task", &[("T", 0)]),
                Clause::and(
                    Clause::Fact(open("pick", &[("T", 0)])),
                    Clause::Fact(open("done", &[("T", 0)])),
                ),
            )],
        ));
        let mut db = Database::new();
        db.register_action(Box::new(AlwaysAdmissible("pick")));

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("task", &["box1"]), &db.rule_set())
            .unwrap();
        list.solve_goals(&RuleSet::new(), &db);

        let json = serde_json::to_value(list.snapshot()).unwrap();
        let entry = &json["goals"][0];
        assert_eq!(entry["target"]["name"], "task");
        assert_eq!(entry["target"]["terms"][0]["Constant"], "box1");
        assert_eq!(entry["definition"]["Rule"]["head"]["name"], "task");
        // parked on the stuck conjunction, head first
        assert_eq!(entry["deepest_leaf"]["And"][0]["Fact"]["name"], "pick");
        // bindings are keyed by variable id; serde_json renders the integer
        // keys as strings
        assert_eq!(
            entry["pending_substitution"]["bindings"]["1"]["Constant"],
            "box1"
        );
    }

    #[test]
    fn parked_goal_resumes_from_checkpoint_next_cycle() {
        init_logs();
        // cycle 1: task(box1) gets stuck on the pick action and queues it.
        // cycle 2: the driver perceived pick(box1); an initiator turned it
        // into done(box1); the goal resumes from the stuck conjunction and
        // succeeds without re-deriving anything above it.
        let mut goal_set = GoalSet::new();
        goal_set.add_template(GoalTemplate::new(
            "task",
            vec![Rule::new(
                open("task", &[("T", 0)]),
                Clause::and(
                    Clause::Fact(open("pick", &[("T", 0)])),
                    Clause::Fact(open("done", &[("T", 0)])),
                ),
            )],
        ));
        let mut db = Database::new();
        db.register_action(Box::new(AlwaysAdmissible("pick")));
        db.add_initiator(
            PostDeclaration::new(
                open("pick", &[("X", 0)]),
                open("done", &[("X", 0)]),
                vec![0],
            )
            .unwrap(),
        );

        let mut list = GoalsList::new(goal_set);
        list.add_goal(ground("task", &["box1"]), &db.rule_set())
            .unwrap();

        // cycle 1
        let next = list.solve_goals(&RuleSet::new(), &db);
        assert_eq!(next.get(0).unwrap().head, ground("pick", &["box1"]));
        assert_eq!(list.len(), 1);

        // drive cycle 2 by hand so the proof tree can be instrumented
        let event = ground("pick", &["box1"]);
        db.updates(&[event.clone()]);
        let mut rules = db.rule_set();
        rules.extend(&RuleSet::from_rules(vec![Rule::fact(event)]));

        let (mut goal, mut tree) = list.goals.pop().unwrap();
        let root = tree.root();
        tree.clear_visit_log();
        let mut next_events = RuleSet::new();
        let solved = GoalsList::solve_goal(&mut goal, &mut tree, &rules, &db, &mut next_events);

        assert!(solved, "new facts must complete the parked goal");
        assert!(
            !tree.visit_log().contains(&root),
            "resumption must start at the checkpoint, not the root"
        );
    }
}
