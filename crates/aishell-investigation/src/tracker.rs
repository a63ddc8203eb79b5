// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation investigation state.
//!
//! An investigation walks from a question through schema discovery and a
//! series of diagnostic queries to numbered recommendations. The tracker
//! enforces two rules along the way: catalog objects must have their schema
//! fetched before a query touches them, and recommendations need a minimum
//! number of executed queries behind them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use aishell_config::model::InvestigationConfig;
use aishell_core::types::ObjectSchema;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{InvestigationContext, NumberedOption};
use crate::objects::{extract_system_objects, normalize_object_name};

/// Where an investigation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "queries", rename_all = "snake_case")]
pub enum InvestigationPhase {
    Idle,
    QuestionAnalyzed,
    SchemaFetched,
    QueryGenerated,
    QueryExecuted(u32),
    ResultsAnalyzed,
    RecommendationsProvided,
    AwaitingSelection,
}

impl InvestigationPhase {
    /// Started but not yet concluded.
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::RecommendationsProvided | Self::AwaitingSelection
        )
    }
}

/// Reasons a step of the workflow is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvestigationError {
    #[error("schema not fetched for {}", objects.join(", "))]
    SchemaRequired { objects: Vec<String> },

    #[error("another diagnostic query is still running")]
    QueryInFlight,

    #[error("{executed} of {required} required diagnostic queries executed")]
    InsufficientEvidence { executed: u32, required: u32 },

    #[error("no investigation has been started")]
    NotStarted,
}

/// Proof that a diagnostic query was admitted; hand it back to
/// [`InvestigationTracker::finish_query`].
///
/// Dropping an unfinished ticket, as happens when an aborted turn drops the
/// query future, frees the slot without counting the query as evidence.
#[derive(Debug)]
#[must_use]
pub struct QueryTicket {
    id: u64,
    state: Weak<Mutex<TrackerState>>,
}

impl Drop for QueryTicket {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        if state.in_flight == Some(self.id) {
            state.in_flight = None;
            debug!(ticket = self.id, "unfinished diagnostic query released");
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    phase: InvestigationPhase,
    question: Option<String>,
    schemas: HashMap<String, ObjectSchema>,
    in_flight: Option<u64>,
    next_ticket: u64,
    queries_this_turn: u32,
    queries_this_investigation: u32,
    findings: Vec<String>,
    issues: Vec<String>,
    root_cause: Option<String>,
    minimum_required: u32,
}

/// Investigation state for one conversation.
#[derive(Debug)]
pub struct InvestigationTracker {
    system_schemas: Vec<String>,
    configured_minimum: u32,
    floor: u32,
    state: Arc<Mutex<TrackerState>>,
}

impl InvestigationTracker {
    pub fn new(config: &InvestigationConfig) -> Self {
        let floor = config.query_floor;
        Self {
            system_schemas: config.system_schemas.clone(),
            configured_minimum: config.minimum_required_queries,
            floor,
            state: Arc::new(Mutex::new(TrackerState {
                phase: InvestigationPhase::Idle,
                question: None,
                schemas: HashMap::new(),
                in_flight: None,
                next_ticket: 0,
                queries_this_turn: 0,
                queries_this_investigation: 0,
                findings: Vec::new(),
                issues: Vec::new(),
                root_cause: None,
                minimum_required: config.minimum_required_queries.max(floor),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Applies a provider-specific minimum. Values below the floor are raised
    /// to it; `None` restores the configured default.
    pub fn set_minimum_required(&self, minimum: Option<u32>) {
        let effective = minimum.unwrap_or(self.configured_minimum).max(self.floor);
        self.lock().minimum_required = effective;
    }

    pub fn minimum_required(&self) -> u32 {
        self.lock().minimum_required
    }

    pub fn phase(&self) -> InvestigationPhase {
        self.lock().phase
    }

    pub fn system_schemas(&self) -> &[String] {
        &self.system_schemas
    }

    pub fn queries_this_turn(&self) -> u32 {
        self.lock().queries_this_turn
    }

    pub fn queries_executed(&self) -> u32 {
        self.lock().queries_this_investigation
    }

    /// Open investigation that has not gathered enough evidence yet.
    pub fn below_minimum(&self) -> bool {
        let state = self.lock();
        state.phase.is_open() && state.queries_this_investigation < state.minimum_required
    }

    /// Resets per-turn guards. Called once per user message, never per
    /// assistant message inside a tool loop. A query still running from an
    /// aborted turn keeps its slot until its ticket is finished or dropped.
    pub fn begin_turn(&self) {
        let mut state = self.lock();
        state.queries_this_turn = 0;
        if state.phase == InvestigationPhase::AwaitingSelection {
            state.phase = InvestigationPhase::Idle;
        }
    }

    /// Starts a new investigation for `question`. Fetched schemas are kept;
    /// they are valid for the whole session.
    pub fn analyze_question(&self, question: &str) {
        let mut state = self.lock();
        state.phase = InvestigationPhase::QuestionAnalyzed;
        state.question = Some(question.trim().to_string());
        state.queries_this_investigation = 0;
        state.queries_this_turn = 0;
        state.findings.clear();
        state.issues.clear();
        state.root_cause = None;
        info!(question = %question.trim(), "investigation started");
    }

    pub fn question(&self) -> Option<String> {
        self.lock().question.clone()
    }

    pub fn record_schema(&self, schema: ObjectSchema) {
        let key = normalize_object_name(&schema.object);
        let mut state = self.lock();
        debug!(object = %key, columns = schema.columns.len(), "schema recorded");
        state.schemas.insert(key, schema);
        if state.phase == InvestigationPhase::QuestionAnalyzed {
            state.phase = InvestigationPhase::SchemaFetched;
        }
    }

    pub fn schema_for(&self, object: &str) -> Option<ObjectSchema> {
        self.lock().schemas.get(&normalize_object_name(object)).cloned()
    }

    /// Catalog objects referenced by `sql` whose schema has not been fetched.
    pub fn check_schema_first(&self, sql: &str) -> Result<(), InvestigationError> {
        let state = self.lock();
        let missing: Vec<String> = extract_system_objects(sql, &self.system_schemas)
            .into_iter()
            .filter(|object| !state.schemas.contains_key(object))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InvestigationError::SchemaRequired { objects: missing })
        }
    }

    pub fn note_query_generated(&self) {
        let mut state = self.lock();
        if state.phase != InvestigationPhase::Idle {
            state.phase = InvestigationPhase::QueryGenerated;
        }
    }

    /// Admits a diagnostic query. Only one may run at a time and every
    /// catalog object it references must have a fetched schema.
    pub fn begin_query(&self, sql: &str) -> Result<QueryTicket, InvestigationError> {
        self.check_schema_first(sql)?;
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return Err(InvestigationError::QueryInFlight);
        }
        state.next_ticket += 1;
        let id = state.next_ticket;
        state.in_flight = Some(id);
        Ok(QueryTicket {
            id,
            state: Arc::downgrade(&self.state),
        })
    }

    /// Releases the in-flight slot. Only successful queries count as evidence.
    pub fn finish_query(&self, ticket: QueryTicket, succeeded: bool) {
        let mut state = self.lock();
        if state.in_flight != Some(ticket.id) {
            // Ticket from before a reset.
            return;
        }
        state.in_flight = None;
        if !succeeded {
            return;
        }
        state.queries_this_turn += 1;
        state.queries_this_investigation += 1;
        if state.phase != InvestigationPhase::Idle {
            state.phase = InvestigationPhase::QueryExecuted(state.queries_this_investigation);
        }
        debug!(
            turn = state.queries_this_turn,
            investigation = state.queries_this_investigation,
            "diagnostic query executed"
        );
    }

    pub fn record_findings(
        &self,
        findings: Vec<String>,
        issues: Vec<String>,
        root_cause: Option<String>,
    ) -> Result<(), InvestigationError> {
        let mut state = self.lock();
        if state.phase == InvestigationPhase::Idle {
            return Err(InvestigationError::NotStarted);
        }
        state.findings.extend(findings);
        state.issues.extend(issues);
        if root_cause.is_some() {
            state.root_cause = root_cause;
        }
        state.phase = InvestigationPhase::ResultsAnalyzed;
        Ok(())
    }

    pub fn ensure_minimum_evidence(&self) -> Result<(), InvestigationError> {
        let state = self.lock();
        if state.queries_this_investigation < state.minimum_required {
            return Err(InvestigationError::InsufficientEvidence {
                executed: state.queries_this_investigation,
                required: state.minimum_required,
            });
        }
        Ok(())
    }

    /// Concludes the investigation and builds the numbered context for the
    /// user's follow-up. Options are numbered from 1 in the order given.
    pub fn provide_recommendations(
        &self,
        recommendations: Vec<String>,
        next_steps: Vec<String>,
        root_cause: Option<String>,
    ) -> Result<InvestigationContext, InvestigationError> {
        if self.phase() == InvestigationPhase::Idle {
            return Err(InvestigationError::NotStarted);
        }
        self.ensure_minimum_evidence()?;

        let mut state = self.lock();
        if root_cause.is_some() {
            state.root_cause = root_cause;
        }
        let context = InvestigationContext {
            timestamp: chrono::Utc::now(),
            question: state.question.clone(),
            findings: state.findings.clone(),
            issues: state.issues.clone(),
            root_cause: state.root_cause.clone(),
            recommendations: NumberedOption::number(recommendations),
            next_steps: NumberedOption::number(next_steps),
        };
        state.phase = if context.has_options() {
            InvestigationPhase::AwaitingSelection
        } else {
            InvestigationPhase::Idle
        };
        info!(
            queries = state.queries_this_investigation,
            recommendations = context.recommendations.len(),
            next_steps = context.next_steps.len(),
            "investigation concluded"
        );
        Ok(context)
    }

    /// Forgets everything, including fetched schemas. Used when the chat is
    /// cleared and a new session begins.
    pub fn reset(&self) {
        let mut state = self.lock();
        let minimum_required = state.minimum_required;
        let next_ticket = state.next_ticket;
        *state = TrackerState {
            phase: InvestigationPhase::Idle,
            question: None,
            schemas: HashMap::new(),
            in_flight: None,
            next_ticket,
            queries_this_turn: 0,
            queries_this_investigation: 0,
            findings: Vec::new(),
            issues: Vec::new(),
            root_cause: None,
            minimum_required,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aishell_core::types::ColumnInfo;

    fn tracker() -> InvestigationTracker {
        InvestigationTracker::new(&InvestigationConfig::default())
    }

    fn schema(object: &str) -> ObjectSchema {
        ObjectSchema {
            object: object.to_string(),
            columns: vec![ColumnInfo {
                name: "session_id".into(),
                data_type: "smallint".into(),
                nullable: false,
            }],
        }
    }

    fn run(tracker: &InvestigationTracker, sql: &str) {
        let ticket = tracker.begin_query(sql).expect("query admitted");
        tracker.finish_query(ticket, true);
    }

    #[test]
    fn minimum_respects_floor() {
        let t = tracker();
        assert_eq!(t.minimum_required(), 5);
        t.set_minimum_required(Some(3));
        assert_eq!(t.minimum_required(), 3);
        t.set_minimum_required(Some(1));
        assert_eq!(t.minimum_required(), 3);
        t.set_minimum_required(None);
        assert_eq!(t.minimum_required(), 5);
    }

    #[test]
    fn schema_first_is_enforced_per_object() {
        let t = tracker();
        t.analyze_question("why is it slow");
        let sql = "SELECT * FROM sys.dm_exec_requests r JOIN sys.dm_exec_sessions s ON r.session_id = s.session_id";

        let err = t.begin_query(sql).unwrap_err();
        assert_eq!(
            err,
            InvestigationError::SchemaRequired {
                objects: vec!["sys.dm_exec_requests".into(), "sys.dm_exec_sessions".into()]
            }
        );

        t.record_schema(schema("[sys].[dm_exec_requests]"));
        let err = t.begin_query(sql).unwrap_err();
        assert_eq!(
            err,
            InvestigationError::SchemaRequired {
                objects: vec!["sys.dm_exec_sessions".into()]
            }
        );

        t.record_schema(schema("sys.dm_exec_sessions"));
        run(&t, sql);
        assert_eq!(t.phase(), InvestigationPhase::QueryExecuted(1));
    }

    #[test]
    fn user_tables_need_no_schema() {
        let t = tracker();
        run(&t, "SELECT TOP 5 * FROM dbo.orders");
        assert_eq!(t.queries_executed(), 1);
        // No investigation open, so the phase stays put.
        assert_eq!(t.phase(), InvestigationPhase::Idle);
    }

    #[test]
    fn one_query_in_flight() {
        let t = tracker();
        let first = t.begin_query("SELECT 1").unwrap();
        assert_eq!(
            t.begin_query("SELECT 2").unwrap_err(),
            InvestigationError::QueryInFlight
        );
        t.finish_query(first, true);
        let second = t.begin_query("SELECT 2").unwrap();
        t.finish_query(second, false);
        assert_eq!(t.queries_executed(), 1);
    }

    #[test]
    fn turn_counter_resets_but_investigation_counter_does_not() {
        let t = tracker();
        t.analyze_question("blocking");
        run(&t, "SELECT 1");
        run(&t, "SELECT 2");
        assert_eq!(t.queries_this_turn(), 2);

        t.begin_turn();
        assert_eq!(t.queries_this_turn(), 0);
        assert_eq!(t.queries_executed(), 2);
        run(&t, "SELECT 3");
        assert_eq!(t.queries_this_turn(), 1);
        assert_eq!(t.queries_executed(), 3);
    }

    #[test]
    fn query_from_an_aborted_turn_keeps_its_slot_until_it_finishes() {
        let t = tracker();
        let running = t.begin_query("SELECT 1").unwrap();
        t.begin_turn();
        assert_eq!(
            t.begin_query("SELECT 2").unwrap_err(),
            InvestigationError::QueryInFlight
        );
        t.finish_query(running, true);
        assert_eq!(t.queries_executed(), 1);
        run(&t, "SELECT 2");
        assert_eq!(t.queries_executed(), 2);
    }

    #[test]
    fn dropped_ticket_frees_the_slot_without_counting() {
        let t = tracker();
        let abandoned = t.begin_query("SELECT 1").unwrap();
        t.begin_turn();
        drop(abandoned);
        run(&t, "SELECT 2");
        assert_eq!(t.queries_executed(), 1);
    }

    #[test]
    fn reset_invalidates_outstanding_tickets() {
        let t = tracker();
        let stale = t.begin_query("SELECT 1").unwrap();
        t.reset();
        let fresh = t.begin_query("SELECT 2").unwrap();
        t.finish_query(stale, true);
        assert_eq!(t.queries_executed(), 0);
        t.finish_query(fresh, true);
        assert_eq!(t.queries_executed(), 1);
    }

    #[test]
    fn recommendations_need_minimum_evidence() {
        let t = tracker();
        t.set_minimum_required(Some(3));
        t.analyze_question("high cpu");
        run(&t, "SELECT 1");
        run(&t, "SELECT 2");

        let err = t
            .provide_recommendations(vec!["Add an index".into()], vec![], None)
            .unwrap_err();
        assert_eq!(
            err,
            InvestigationError::InsufficientEvidence {
                executed: 2,
                required: 3
            }
        );
        assert!(t.below_minimum());

        run(&t, "SELECT 3");
        t.record_findings(vec!["scan on orders".into()], vec![], Some("missing index".into()))
            .unwrap();
        assert_eq!(t.phase(), InvestigationPhase::ResultsAnalyzed);

        let ctx = t
            .provide_recommendations(
                vec!["Add an index".into()],
                vec!["Check the plan".into(), "Rebuild stats".into()],
                None,
            )
            .unwrap();
        assert_eq!(ctx.root_cause.as_deref(), Some("missing index"));
        assert_eq!(ctx.findings, vec!["scan on orders"]);
        assert_eq!(ctx.next_steps[1].number, 2);
        assert_eq!(t.phase(), InvestigationPhase::AwaitingSelection);
        assert!(!t.below_minimum());
    }

    #[test]
    fn new_question_resets_evidence() {
        let t = tracker();
        t.set_minimum_required(Some(3));
        t.analyze_question("first");
        for _ in 0..3 {
            run(&t, "SELECT 1");
        }
        t.analyze_question("second");
        assert_eq!(t.queries_executed(), 0);
        assert!(t.ensure_minimum_evidence().is_err());
    }

    #[test]
    fn nothing_to_conclude_without_a_question() {
        let t = tracker();
        assert_eq!(
            t.provide_recommendations(vec![], vec![], None).unwrap_err(),
            InvestigationError::NotStarted
        );
        assert_eq!(
            t.record_findings(vec![], vec![], None).unwrap_err(),
            InvestigationError::NotStarted
        );
    }

    #[test]
    fn reset_forgets_schemas() {
        let t = tracker();
        t.record_schema(schema("sys.objects"));
        assert!(t.schema_for("SYS.OBJECTS").is_some());
        t.reset();
        assert!(t.schema_for("sys.objects").is_none());
        assert!(t.check_schema_first("SELECT * FROM sys.objects").is_err());
    }
}
