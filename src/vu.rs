//! Virtual user (VU) executor.
//!
//! Each VU runs the plan's iteration in a loop until its stop token is
//! cancelled. The stop token is only checked between iterations, so a
//! retiring VU always finishes the iteration it is in. Every response is
//! turned into samples in the shared [`MetricRegistry`]; transport failures
//! and failed checks are recorded, never propagated.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::check::CheckResult;
use crate::error::{LoadTestError, TransportError};
use crate::metrics::{builtin, MetricKind, MetricRegistry, TagSet};
use crate::plan::{
    default_error_metric, resolve_url, RequestBody, RequestGroup, RequestSpec, Step, TestPlan,
    UrlTemplate, Variables,
};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Atomic counter tracking the number of running virtual user tasks,
/// including VUs that were told to stop and are finishing an iteration.
#[derive(Clone)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of running VU tasks.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Global cap on started iterations across all VUs.
///
/// First-limit-wins with the stage schedule; a VU that finds the budget
/// exhausted stops the whole run.
#[derive(Debug)]
pub struct IterationBudget {
    started: AtomicU64,
    max: u64,
}

impl IterationBudget {
    pub fn new(max: u64) -> Self {
        Self {
            started: AtomicU64::new(0),
            max,
        }
    }

    /// Claims one iteration; `false` once the budget is spent.
    pub fn take(&self) -> bool {
        self.started.fetch_add(1, Ordering::Relaxed) < self.max
    }
}

struct PreparedRequest {
    spec: RequestSpec,
    name: String,
    template: UrlTemplate,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    timeout: Duration,
    metrics: Vec<(String, MetricKind)>,
}

struct PreparedGroup {
    name: String,
    error_metric: String,
    trend: Option<String>,
    requests: Vec<PreparedRequest>,
}

enum PreparedStep {
    Sequential(PreparedGroup),
    Batch(PreparedGroup),
    Random(PreparedGroup, WeightedIndex<u32>),
    Pause(Duration),
}

/// Everything a VU needs, shared read-only by all VUs of a run.
pub struct VuContext {
    plan: Arc<TestPlan>,
    steps: Vec<PreparedStep>,
    registry: Arc<MetricRegistry>,
    transport: Arc<dyn Transport>,
    budget: Option<IterationBudget>,
    run_stop: CancellationToken,
}

impl VuContext {
    /// Resolves headers, bodies, URL templates and metric kinds once so the
    /// iteration loop does no parsing.
    pub fn new(
        plan: Arc<TestPlan>,
        registry: Arc<MetricRegistry>,
        transport: Arc<dyn Transport>,
        run_stop: CancellationToken,
    ) -> Result<Self, LoadTestError> {
        let mut steps = Vec::with_capacity(plan.iteration.steps.len());
        for step in &plan.iteration.steps {
            let prepared = match step {
                Step::Pause(pause) => PreparedStep::Pause(pause.duration.as_duration()),
                Step::Group(group) => {
                    PreparedStep::Sequential(prepare_group(&plan, &registry, group)?)
                }
                Step::Batch(group) => PreparedStep::Batch(prepare_group(&plan, &registry, group)?),
                Step::Random(group) => {
                    let weights: Vec<u32> = group.requests.iter().map(|r| r.weight).collect();
                    let dist = WeightedIndex::new(&weights).map_err(|e| {
                        LoadTestError::validation(format!("invalid random step weights: {e}"))
                    })?;
                    PreparedStep::Random(prepare_group(&plan, &registry, group)?, dist)
                }
            };
            steps.push(prepared);
        }

        Ok(Self {
            plan,
            steps,
            registry,
            transport,
            budget: None,
            run_stop,
        })
    }

    /// Caps the total number of iterations started across all VUs.
    pub fn with_iteration_budget(mut self, max: u64) -> Self {
        self.budget = Some(IterationBudget::new(max));
        self
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    fn take_iteration(&self) -> bool {
        self.budget.as_ref().is_none_or(IterationBudget::take)
    }

    /// Runs one full pass over the iteration's steps.
    pub async fn run_iteration(&self, vu: &mut VuState) {
        let start = Instant::now();
        let _active = self
            .plan
            .iteration
            .active_gauge
            .as_deref()
            .map(|gauge| ActiveGaugeGuard::enter(&self.registry, gauge));

        for step in &self.steps {
            self.execute_step(step, vu).await;
        }

        let tags = TagSet::new();
        self.registry.emit(builtin::ITERATIONS, 1.0, &tags);
        self.registry.emit(
            builtin::ITERATION_DURATION,
            start.elapsed().as_secs_f64() * 1000.0,
            &tags,
        );
        vu.iteration += 1;
    }

    /// Executes one step and returns its responses in declaration order.
    async fn execute_step(&self, step: &PreparedStep, vu: &mut VuState) -> Vec<HttpResponse> {
        let (group, responses) = match step {
            PreparedStep::Pause(duration) => {
                tokio::time::sleep(*duration).await;
                return Vec::new();
            }
            PreparedStep::Sequential(group) => {
                let start = Instant::now();
                let mut responses = Vec::with_capacity(group.requests.len());
                for request in &group.requests {
                    let response = self.send(request, vu.id, vu.iteration).await;
                    self.record_response(group, request, &response);
                    responses.push(response);
                }
                self.record_group_duration(group, start);
                return responses;
            }
            PreparedStep::Batch(group) => {
                let start = Instant::now();
                let (id, iteration) = (vu.id, vu.iteration);
                let responses = join_all(
                    group
                        .requests
                        .iter()
                        .map(|request| self.send(request, id, iteration)),
                )
                .await;
                self.record_group_duration(group, start);
                (group, responses)
            }
            PreparedStep::Random(group, dist) => {
                let start = Instant::now();
                let request = &group.requests[dist.sample(&mut vu.rng)];
                let response = self.send(request, vu.id, vu.iteration).await;
                self.record_response(group, request, &response);
                self.record_group_duration(group, start);
                return vec![response];
            }
        };

        for (request, response) in group.requests.iter().zip(&responses) {
            self.record_response(group, request, response);
        }
        responses
    }

    async fn send(&self, request: &PreparedRequest, vu: u64, iteration: u64) -> HttpResponse {
        let rendered = request.template.render(Variables {
            plan: &self.plan.variables,
            vu,
            iteration,
        });
        let http = HttpRequest {
            method: request.spec.method,
            url: resolve_url(self.plan.base_url.as_deref(), &rendered),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: request.timeout,
        };

        // The transport is expected to honor the timeout itself; this is the
        // backstop for transports that do not.
        match tokio::time::timeout(request.timeout, self.transport.send(&http)).await {
            Ok(response) => response,
            Err(_) => HttpResponse::failed(TransportError::Timeout, request.timeout),
        }
    }

    fn record_response(&self, group: &PreparedGroup, request: &PreparedRequest, response: &HttpResponse) {
        let registry = &*self.registry;
        let mut tags = TagSet::new()
            .with("group", group.name.as_str())
            .with("name", request.name.as_str())
            .with("method", request.spec.method.as_str())
            .with("status", response.status.to_string());
        if let Some(err) = &response.error {
            tags.insert("error", err.error_category());
            tracing::debug!(request = %request.name, "request failed: {err}");
        }

        let duration_ms = response.duration_ms();
        let failed = response.error.is_some() || !request.spec.is_expected_status(response.status);

        // Unknown metric writes are logged by the registry; the plan was
        // validated, so they cannot happen here.
        registry.emit(builtin::HTTP_REQS, 1.0, &tags);
        registry.emit(builtin::HTTP_REQ_DURATION, duration_ms, &tags);
        registry.emit(builtin::HTTP_REQ_FAILED, bool_sample(failed), &tags);
        registry.emit(builtin::DATA_RECEIVED, response.body_size as f64, &tags);

        let results: Vec<CheckResult> = request
            .spec
            .checks
            .iter()
            .map(|check| check.evaluate(response))
            .collect();
        for result in &results {
            registry.record_check(&group.name, &result.name, result.passed, &tags);
        }
        let errored = response.error.is_some() || results.iter().any(|r| !r.passed);
        registry.emit(&group.error_metric, bool_sample(errored), &tags);

        if let Some(trend) = &group.trend {
            registry.emit(trend, duration_ms, &tags);
        }
        for (metric, kind) in &request.metrics {
            let value = match kind {
                MetricKind::Counter => 1.0,
                MetricKind::Rate => bool_sample(!errored),
                MetricKind::Trend | MetricKind::Gauge => duration_ms,
            };
            registry.emit(metric, value, &tags);
        }
    }

    fn record_group_duration(&self, group: &PreparedGroup, start: Instant) {
        let tags = TagSet::new().with("group", group.name.as_str());
        self.registry.emit(
            builtin::GROUP_DURATION,
            start.elapsed().as_secs_f64() * 1000.0,
            &tags,
        );
    }
}

fn bool_sample(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn prepare_group(
    plan: &TestPlan,
    registry: &MetricRegistry,
    group: &RequestGroup,
) -> Result<PreparedGroup, LoadTestError> {
    let requests = group
        .requests
        .iter()
        .map(|spec| prepare_request(plan, registry, spec))
        .collect::<Result<_, _>>()?;
    Ok(PreparedGroup {
        name: group.group_name().to_string(),
        error_metric: group
            .error_metric
            .clone()
            .unwrap_or_else(|| default_error_metric().to_string()),
        trend: group.trend.clone(),
        requests,
    })
}

fn prepare_request(
    plan: &TestPlan,
    registry: &MetricRegistry,
    spec: &RequestSpec,
) -> Result<PreparedRequest, LoadTestError> {
    let name = spec.display_name();
    let template = UrlTemplate::parse(&spec.url).map_err(|source| LoadTestError::Template {
        request: name.clone(),
        source,
    })?;

    let mut merged = plan.headers.clone();
    merged.extend(spec.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    let body = match &spec.body {
        None => None,
        Some(RequestBody::Text(text)) => Some(Bytes::from(text.clone())),
        Some(RequestBody::Json(value)) => {
            if !merged.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                merged.insert("Content-Type".to_string(), "application/json".to_string());
            }
            let encoded = serde_json::to_vec(value).map_err(|e| {
                LoadTestError::validation(format!("request '{name}' has an unencodable body: {e}"))
            })?;
            Some(Bytes::from(encoded))
        }
    };

    let metrics = spec
        .metrics
        .iter()
        .map(|metric| {
            registry
                .kind_of(metric)
                .map(|kind| (metric.clone(), kind))
                .ok_or_else(|| {
                    LoadTestError::validation(format!(
                        "request '{name}' feeds undeclared metric '{metric}'"
                    ))
                })
        })
        .collect::<Result<_, _>>()?;

    Ok(PreparedRequest {
        spec: spec.clone(),
        timeout: spec
            .timeout
            .unwrap_or(plan.settings.timeout)
            .as_duration(),
        name,
        template,
        headers: merged.into_iter().collect(),
        body,
        metrics,
    })
}

/// Moves the active gauge `+1` on creation and `-1` on drop, so an
/// interrupted iteration still gives its slot back.
struct ActiveGaugeGuard<'a> {
    registry: &'a MetricRegistry,
    gauge: &'a str,
}

impl<'a> ActiveGaugeGuard<'a> {
    fn enter(registry: &'a MetricRegistry, gauge: &'a str) -> Self {
        registry.emit_delta(gauge, 1.0, &TagSet::new());
        Self { registry, gauge }
    }
}

impl Drop for ActiveGaugeGuard<'_> {
    fn drop(&mut self) {
        self.registry.emit_delta(self.gauge, -1.0, &TagSet::new());
    }
}

/// Per-VU working data: id, iteration number, random source.
pub struct VuState {
    /// 1-based VU id (`${__VU}`).
    pub id: u64,
    /// 0-based iteration number of this VU (`${__ITER}`).
    pub iteration: u64,
    rng: StdRng,
}

impl VuState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            iteration: 0,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// Main virtual user task loop.
///
/// Each VU:
/// 1. Checks its stop token and the iteration budget.
/// 2. Runs one iteration, abandoning it only if `interrupt` fires (grace
///    period expired).
/// 3. Yields, then repeats.
///
/// The `active_vus` counter is incremented on entry and decremented on all
/// exit paths.
pub async fn vu_loop(
    vu_id: u64,
    ctx: Arc<VuContext>,
    stop: CancellationToken,
    interrupt: CancellationToken,
    active_vus: ActiveVuCounter,
) {
    active_vus.increment();
    tracing::debug!(vu_id, "virtual user started");
    let mut state = VuState::new(vu_id);

    loop {
        if stop.is_cancelled() {
            break;
        }
        if !ctx.take_iteration() {
            tracing::info!(vu_id, "iteration limit reached, stopping run");
            ctx.run_stop.cancel();
            break;
        }

        tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                tracing::debug!(vu_id, "iteration interrupted after grace period");
                break;
            }
            _ = ctx.run_iteration(&mut state) => {}
        }
        tokio::task::yield_now().await;
    }

    tracing::debug!(vu_id, iterations = state.iteration, "virtual user stopped");
    active_vus.decrement();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Check, CheckCondition};
    use crate::plan::{IterationSpec, PauseSpec, PlanDuration, Settings, Stage};
    use crate::transport::mock::{Reply, ScriptedTransport};
    use std::collections::BTreeMap;

    fn plan_with(steps: Vec<Step>) -> TestPlan {
        let mut metrics = BTreeMap::new();
        metrics.insert("users_requests".to_string(), MetricKind::Counter);
        metrics.insert("users_time".to_string(), MetricKind::Trend);
        metrics.insert("active_connections".to_string(), MetricKind::Gauge);
        TestPlan {
            base_url: Some("http://api.test/api/web".to_string()),
            settings: Settings {
                timeout: PlanDuration::from_secs(1),
                ..Settings::default()
            },
            headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
            variables: BTreeMap::from([("user_id".to_string(), "u1".to_string())]),
            stages: vec![Stage::new(Duration::from_secs(1), 1)],
            thresholds: BTreeMap::new(),
            metrics,
            iteration: IterationSpec {
                active_gauge: Some("active_connections".to_string()),
                steps,
            },
        }
    }

    fn group(name: &str, requests: Vec<RequestSpec>) -> RequestGroup {
        RequestGroup {
            name: Some(name.to_string()),
            error_metric: None,
            trend: None,
            requests,
        }
    }

    fn context(plan: TestPlan, transport: Arc<ScriptedTransport>) -> VuContext {
        let plan = Arc::new(plan);
        let registry = Arc::new(plan.build_registry().unwrap());
        VuContext::new(plan, registry, transport, CancellationToken::new()).unwrap()
    }

    fn status_check() -> Check {
        Check::named("status ok", CheckCondition::Status { allowed: vec![200, 304] })
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_order_when_middle_request_times_out() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url.ends_with("/b") {
                Reply::ok(5_000)
            } else if req.url.ends_with("/a") {
                Reply::status(201, 300)
            } else {
                Reply::status(202, 10)
            }
        }));
        let plan = plan_with(vec![Step::Batch(group(
            "batch",
            vec![
                RequestSpec::get("/a"),
                RequestSpec::get("/b"),
                RequestSpec::get("/c"),
            ],
        ))]);
        let ctx = context(plan, Arc::clone(&transport));
        let mut vu = VuState::new(1);

        let responses = ctx.execute_step(&ctx.steps[0], &mut vu).await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].status, 201);
        assert_eq!(responses[1].status, 0);
        assert_eq!(responses[1].error, Some(TransportError::Timeout));
        assert_eq!(responses[2].status, 202);

        let snap = ctx.registry().snapshot();
        assert_eq!(snap.counter(builtin::HTTP_REQS).unwrap().count, 3.0);
        let failed = snap.rate(builtin::HTTP_REQ_FAILED).unwrap();
        assert_eq!((failed.passes, failed.total), (1, 3), "only the timeout failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_group_records_checks_and_error_rate() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url.contains("/users/") {
                Reply::ok(20)
            } else {
                Reply::status(500, 20)
            }
        }));
        let users = RequestSpec {
            checks: vec![status_check()],
            metrics: vec!["users_requests".to_string()],
            ..RequestSpec::get("/users/${user_id}")
        };
        let broken = RequestSpec {
            checks: vec![status_check()],
            ..RequestSpec::get("/broken")
        };
        let mut users_group = group("Users API", vec![users, broken]);
        users_group.trend = Some("users_time".to_string());
        let ctx = context(plan_with(vec![Step::Group(users_group)]), Arc::clone(&transport));

        let mut vu = VuState::new(1);
        ctx.run_iteration(&mut vu).await;

        assert_eq!(
            transport.sent_urls(),
            [
                "http://api.test/api/web/users/u1",
                "http://api.test/api/web/broken"
            ]
        );
        let snap = ctx.registry().snapshot();
        assert_eq!(snap.rate(builtin::ERRORS).unwrap().rate(), Some(0.5));
        assert_eq!(snap.counter("users_requests").unwrap().count, 1.0);
        assert_eq!(snap.trend("users_time").unwrap().count, 2);
        assert_eq!(snap.counter(builtin::ITERATIONS).unwrap().count, 1.0);
        assert_eq!(snap.checks.len(), 1);
        assert_eq!((snap.checks[0].passes, snap.checks[0].fails), (1, 1));
        assert_eq!(snap.checks[0].group, "Users API");
        assert_eq!(vu.iteration, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_headers_merge_and_json_body() {
        let transport = Arc::new(ScriptedTransport::always_ok(1));
        let post = RequestSpec {
            method: crate::transport::HttpMethod::Post,
            headers: BTreeMap::from([("X-Trace".to_string(), "1".to_string())]),
            body: Some(RequestBody::Json(serde_json::json!({"a": 1}))),
            ..RequestSpec::get("/items")
        };
        let ctx = context(
            plan_with(vec![Step::Group(group("g", vec![post]))]),
            Arc::clone(&transport),
        );
        ctx.run_iteration(&mut VuState::new(1)).await;

        let sent = transport.sent.lock();
        let headers = &sent[0].headers;
        assert!(headers.contains(&("Accept".to_string(), "application/json".to_string())));
        assert!(headers.contains(&("X-Trace".to_string(), "1".to_string())));
        assert!(headers.contains(&("Content-Type".to_string(), "application/json".to_string())));
        assert_eq!(sent[0].body.as_deref(), Some(&b"{\"a\":1}"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_suspends_only_this_vu() {
        let transport = Arc::new(ScriptedTransport::always_ok(1));
        let ctx = Arc::new(context(
            plan_with(vec![Step::Pause(PauseSpec {
                duration: PlanDuration::from_secs(2),
            })]),
            transport,
        ));

        let start = Instant::now();
        let a = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { ctx.run_iteration(&mut VuState::new(1)).await }
        });
        let b = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { ctx.run_iteration(&mut VuState::new(2)).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(3), "pauses overlap");
        let snap = ctx.registry().snapshot();
        assert_eq!(snap.counter(builtin::ITERATIONS).unwrap().count, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_gauge_returns_to_zero() {
        let transport = Arc::new(ScriptedTransport::always_ok(5));
        let ctx = context(
            plan_with(vec![Step::Group(group("g", vec![RequestSpec::get("/x")]))]),
            transport,
        );
        ctx.run_iteration(&mut VuState::new(1)).await;
        let snap = ctx.registry().snapshot();
        let gauge = snap.gauge("active_connections").unwrap();
        assert_eq!(gauge.value, Some(0.0));
        assert_eq!(gauge.max, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_step_sends_exactly_one_weighted_request() {
        let transport = Arc::new(ScriptedTransport::always_ok(1));
        let never = RequestSpec {
            weight: 0,
            ..RequestSpec::get("/never")
        };
        let always = RequestSpec::get("/always");
        let ctx = context(
            plan_with(vec![Step::Random(group("r", vec![never, always]))]),
            Arc::clone(&transport),
        );
        let mut vu = VuState::new(1);
        for _ in 0..20 {
            ctx.run_iteration(&mut vu).await;
        }
        let urls = transport.sent_urls();
        assert_eq!(urls.len(), 20);
        assert!(urls.iter().all(|u| u.ends_with("/always")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vu_loop_honors_stop_between_iterations() {
        let transport = Arc::new(ScriptedTransport::always_ok(100));
        let ctx = Arc::new(context(
            plan_with(vec![Step::Group(group("g", vec![RequestSpec::get("/x")]))]),
            Arc::clone(&transport),
        ));
        let stop = CancellationToken::new();
        let active = ActiveVuCounter::new();
        let handle = tokio::spawn(vu_loop(
            1,
            Arc::clone(&ctx),
            stop.clone(),
            CancellationToken::new(),
            active.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        stop.cancel();
        handle.await.unwrap();

        assert_eq!(active.get(), 0);
        let snap = ctx.registry().snapshot();
        let iterations = snap.counter(builtin::ITERATIONS).unwrap().count;
        assert_eq!(
            iterations,
            transport.sent_urls().len() as f64,
            "every started iteration completed"
        );
        assert_eq!(iterations, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_budget_stops_run() {
        let transport = Arc::new(ScriptedTransport::always_ok(1));
        let plan = Arc::new(plan_with(vec![Step::Group(group(
            "g",
            vec![RequestSpec::get("/x")],
        ))]));
        let registry = Arc::new(plan.build_registry().unwrap());
        let run_stop = CancellationToken::new();
        let ctx = Arc::new(
            VuContext::new(plan, registry, transport, run_stop.clone())
                .unwrap()
                .with_iteration_budget(5),
        );

        vu_loop(
            1,
            Arc::clone(&ctx),
            run_stop.child_token(),
            CancellationToken::new(),
            ActiveVuCounter::new(),
        )
        .await;

        assert!(run_stop.is_cancelled());
        let snap = ctx.registry().snapshot();
        assert_eq!(snap.counter(builtin::ITERATIONS).unwrap().count, 5.0);
    }

    #[test]
    fn test_active_vu_counter() {
        let counter = ActiveVuCounter::new();
        counter.increment();
        counter.increment();
        counter.decrement();
        assert_eq!(counter.get(), 1);
    }
}
