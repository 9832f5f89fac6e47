//! Walks a compiled route tree, dispatching each node's action and
//! emitting start/completion telemetry to the event bus (§4.3, §4.4).

pub mod error;
pub mod retry;

pub use error::ExecutionError;
pub use retry::{ErrorClass, RetryConfig};

use crate::compiler::{exception_is_assignable as is_assignable, CatchHandler, ChoiceBranch, CompiledBody, CompiledNode, Executable};
use crate::domain::{ExecutionEvent, ExecutionExchange, ExpressionLanguage, Node, NodeType};
use crate::events::EventBus;
use crate::saga::SagaCoordinator;
use crate::templater;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Resolves `direct:<routeId>` endpoints by re-entering the executor for
/// the target route, without the executor holding a permanent reference
/// back to the registry that owns it (that would form an `Arc` cycle).
/// `RouteRegistry` implements this and passes itself in on each call.
#[async_trait]
pub trait DirectRouteInvoker: Send + Sync {
    async fn invoke_direct(&self, internal_key: &str, exchange: ExecutionExchange) -> Result<ExecutionExchange, ExecutionError>;
}

/// A `DirectRouteInvoker` that always fails; used in tests and for
/// standalone route execution outside of a registry.
pub struct NoDirectRoutes;

#[async_trait]
impl DirectRouteInvoker for NoDirectRoutes {
    async fn invoke_direct(&self, internal_key: &str, _exchange: ExecutionExchange) -> Result<ExecutionExchange, ExecutionError> {
        Err(ExecutionError::RouteNotFound(internal_key.to_string()))
    }
}

/// Dispatches `bean:<name>?method=<m>` endpoint calls to host-registered
/// callouts. Unregistered names surface as `UnresolvableEndpoint`; the
/// compiler's `known_bean_names` allowlist (when configured) catches this
/// earlier, at deploy time.
#[async_trait]
pub trait BeanHandler: Send + Sync {
    async fn invoke(&self, method: &str, exchange: ExecutionExchange) -> Result<ExecutionExchange, ExecutionError>;
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub endpoint_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { endpoint_timeout_ms: 30_000, retry: RetryConfig::default() }
    }
}

struct ThrottleState {
    window_start: Instant,
    count: u32,
}

/// Tree-walking interpreter for a single compiled route. Stateless
/// across invocations except for per-node throttle windows, which are
/// shared across concurrent invocations of the same route by design
/// (§4.3 "throttle").
pub struct Executor {
    http: reqwest::Client,
    saga: SagaCoordinator,
    events: Arc<EventBus>,
    config: ExecutorConfig,
    beans: HashMap<String, Arc<dyn BeanHandler>>,
    throttles: parking_lot::Mutex<HashMap<String, ThrottleState>>,
}

impl Executor {
    pub fn new(saga: SagaCoordinator, events: Arc<EventBus>, config: ExecutorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.endpoint_timeout_ms))
            .build()
            .expect("reqwest client builds with static config");
        Self { http, saga, events, config, beans: HashMap::new(), throttles: parking_lot::Mutex::new(HashMap::new()) }
    }

    pub fn with_beans(mut self, beans: HashMap<String, Arc<dyn BeanHandler>>) -> Self {
        self.beans = beans;
        self
    }

    /// Runs `executable`'s root node to completion, threading `exchange`
    /// through the compiled tree.
    pub async fn invoke(
        &self,
        executable: &Executable,
        route_id: &str,
        exchange: ExecutionExchange,
        invoker: &dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        self.run_node(&executable.root, route_id, exchange, invoker).await
    }

    fn run_node<'a>(
        &'a self,
        compiled: &'a CompiledNode,
        route_id: &'a str,
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionExchange, ExecutionError>> + Send + 'a>> {
        Box::pin(async move {
            let node = &compiled.node;
            let started = ExecutionEvent::started(route_id, node.node_type.canonical_token(), &node.id);
            self.events.publish(started.clone());
            let clock = Instant::now();

            let mut own_message: Option<String> = None;
            let outcome = match &compiled.body {
                CompiledBody::Inline { next } => match self.run_own_work(node, route_id, exchange, invoker).await {
                    Ok(ex) => {
                        own_message = node_completion_message(node, &ex);
                        self.run_sequence(next, route_id, ex, invoker).await
                    }
                    Err(e) => Err(e),
                },
                CompiledBody::Choice { branches, otherwise } => self.run_choice(route_id, branches, otherwise, exchange, invoker).await,
                CompiledBody::TryCatch { try_body, catches } => self.run_try_catch(route_id, try_body, catches, exchange, invoker).await,
                CompiledBody::Scope { body } => self.run_scope(node, route_id, body, exchange, invoker).await,
            };

            let elapsed_ms = clock.elapsed().as_millis() as u64;
            match outcome {
                Ok(ex) => {
                    let completed = started.completed(own_message, Some(ex.body.clone()), elapsed_ms);
                    self.events.publish(completed);
                    Ok(ex)
                }
                Err(e) => {
                    let failed = started.failed(e.exception_type(), elapsed_ms);
                    self.events.publish(failed);
                    Err(e)
                }
            }
        })
    }

    async fn run_sequence<'a>(
        &'a self,
        nodes: &'a [CompiledNode],
        route_id: &'a str,
        mut exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        for next in nodes {
            exchange = self.run_node(next, route_id, exchange, invoker).await?;
        }
        Ok(exchange)
    }

    async fn run_choice<'a>(
        &'a self,
        route_id: &'a str,
        branches: &'a [ChoiceBranch],
        otherwise: &'a [CompiledNode],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        for branch in branches {
            let condition = branch.condition.as_deref().unwrap_or("true");
            if templater::evaluate_condition(&exchange, condition) {
                return self.run_sequence(&branch.region, route_id, exchange, invoker).await;
            }
        }
        self.run_sequence(otherwise, route_id, exchange, invoker).await
    }

    async fn run_try_catch<'a>(
        &'a self,
        route_id: &'a str,
        try_body: &'a [CompiledNode],
        catches: &'a [CatchHandler],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        match self.run_sequence(try_body, route_id, exchange.clone(), invoker).await {
            Ok(ex) => Ok(ex),
            Err(e) => {
                let thrown = e.exception_type();
                for handler in catches {
                    if is_assignable(&handler.exception_type, &thrown) {
                        let mut caught = exchange;
                        caught.properties.insert("caughtException".to_string(), Value::String(thrown.clone()));
                        return self.run_sequence(&handler.region, route_id, caught, invoker).await;
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_scope<'a>(
        &'a self,
        node: &'a Node,
        route_id: &'a str,
        body: &'a [CompiledNode],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        match node.node_type {
            NodeType::Filter => self.run_filter(node, route_id, body, exchange, invoker).await,
            NodeType::Split => self.run_split(node, route_id, body, exchange, invoker).await,
            NodeType::Loop => self.run_loop(node, route_id, body, exchange, invoker).await,
            NodeType::Multicast => self.run_multicast(node, route_id, body, exchange, invoker).await,
            other => Err(ExecutionError::Node {
                route_id: route_id.to_string(),
                node_id: node.id.clone(),
                node_type: other.canonical_token().to_string(),
                cause: "node type is not a recognized scope".to_string(),
            }),
        }
    }

    /// Drops the message silently when the predicate is false, matching
    /// Camel's filter semantics: downstream of a false filter simply
    /// never runs for this exchange.
    async fn run_filter<'a>(
        &'a self,
        node: &'a Node,
        route_id: &'a str,
        body: &'a [CompiledNode],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        let expr = node.expression.as_deref().unwrap_or("true");
        let passes = match node.expression_language {
            ExpressionLanguage::Simple => templater::evaluate_condition(&exchange, expr),
            other => is_truthy(&evaluate_by_language(&exchange, expr, other)),
        };
        if passes {
            self.run_sequence(body, route_id, exchange, invoker).await
        } else {
            Ok(exchange)
        }
    }

    /// Evaluates `node.expression` to a JSON array and runs `body` once
    /// per element, with the element as that iteration's body. The
    /// original body is restored once every element has run (§4.3
    /// "split": "preserves the original body after the scope"); each
    /// item's final body is still recorded in
    /// `properties["splitResults"]` for callers that want it.
    async fn run_split<'a>(
        &'a self,
        node: &'a Node,
        route_id: &'a str,
        body: &'a [CompiledNode],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        let expr = node.expression.as_deref().ok_or_else(|| node_error(node, route_id, "split requires an expression"))?;
        let items = match evaluate_by_language(&exchange, expr, node.expression_language) {
            Value::Array(items) => items,
            _ => return Err(node_error(node, route_id, "split expression did not evaluate to an array")),
        };

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let mut item_exchange = exchange.clone();
            item_exchange.body = item;
            let finished = self.run_sequence(body, route_id, item_exchange, invoker).await?;
            results.push(finished.body);
        }

        let mut out = exchange;
        out.properties.insert("splitResults".to_string(), Value::Array(results));
        Ok(out)
    }

    /// Iterates `body`: if `expression` parses as a plain integer, runs
    /// a fixed number of times; otherwise re-evaluates `expression` each
    /// iteration and stops once it yields a falsy value (§4.3 "loop").
    /// A hard iteration ceiling guards against a runaway predicate.
    async fn run_loop<'a>(
        &'a self,
        node: &'a Node,
        route_id: &'a str,
        body: &'a [CompiledNode],
        mut exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        const MAX_ITERATIONS: u32 = 100_000;

        match fixed_loop_count(node) {
            Some(count) => {
                for index in 0..count {
                    exchange.headers.insert("loopIndex".to_string(), Value::from(index as u64));
                    exchange = self.run_sequence(body, route_id, exchange, invoker).await?;
                }
            }
            None => {
                let expr = node.expression.as_deref().unwrap_or("false");
                let mut index = 0u32;
                let condition_holds = |exchange: &ExecutionExchange| match node.expression_language {
                    ExpressionLanguage::Simple => templater::evaluate_condition(exchange, expr),
                    other => is_truthy(&evaluate_by_language(exchange, expr, other)),
                };
                while index < MAX_ITERATIONS && condition_holds(&exchange) {
                    exchange.headers.insert("loopIndex".to_string(), Value::from(index as u64));
                    exchange = self.run_sequence(body, route_id, exchange, invoker).await?;
                    index += 1;
                }
            }
        }
        exchange.headers.remove("loopIndex");
        Ok(exchange)
    }

    /// Runs every outgoing branch concurrently against a clone of the
    /// incoming exchange and waits for all of them (§4.3 "multicast").
    /// The resulting body is the last branch's (in declared order) —
    /// pinning down the spec's "last completed child's body" to a
    /// deterministic choice; all branch bodies are additionally
    /// recorded in `properties["multicastResults"]`. The first failure
    /// (in declared order) is surfaced once every branch has finished.
    async fn run_multicast<'a>(
        &'a self,
        _node: &'a Node,
        route_id: &'a str,
        body: &'a [CompiledNode],
        exchange: ExecutionExchange,
        invoker: &'a dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        let futures = body.iter().map(|branch| {
            let branch_exchange = exchange.clone();
            async move { self.run_node(branch, route_id, branch_exchange, invoker).await }
        });
        let outcomes = join_all(futures).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(ex) => results.push(ex.body),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let mut out = exchange;
        out.body = results.last().cloned().unwrap_or(out.body);
        out.properties.insert("multicastResults".to_string(), Value::Array(results));
        Ok(out)
    }

    /// Dispatches a single non-scoped node's own action. Scoped nodes'
    /// "own work" is their region-execution policy, handled in
    /// `run_scope` instead.
    async fn run_own_work(
        &self,
        node: &Node,
        route_id: &str,
        mut exchange: ExecutionExchange,
        invoker: &dyn DirectRouteInvoker,
    ) -> Result<ExecutionExchange, ExecutionError> {
        match node.node_type {
            NodeType::From => Ok(exchange),

            NodeType::Log => {
                let rendered = node.message.as_deref().map(|m| templater::evaluate_template(&exchange, m)).unwrap_or_default();
                info!(route_id, node_id = %node.id, "{}", rendered);
                Ok(exchange)
            }

            NodeType::SetBody | NodeType::Transform => {
                let expr = node.expression.as_deref().unwrap_or("");
                exchange.body = evaluate_by_language(&exchange, expr, node.expression_language);
                Ok(exchange)
            }

            NodeType::ConvertBodyTo => {
                let target = node.properties.get("targetType").and_then(Value::as_str).unwrap_or("string");
                exchange.body = convert_body(&exchange.body, target);
                Ok(exchange)
            }

            NodeType::Delay => {
                let ms = numeric_property_or_expression(node, &exchange, "ms").unwrap_or(0.0).max(0.0) as u64;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(exchange)
            }

            NodeType::Throttle => {
                let rate = node.properties.get("ratePerSecond").and_then(Value::as_u64).unwrap_or(10).max(1) as u32;
                let key = format!("{route_id}::{}", node.id);
                self.throttle(&key, rate).await;
                Ok(exchange)
            }

            NodeType::To => {
                let uri = node.uri.as_deref().ok_or_else(|| node_error(node, route_id, "to requires a uri"))?;
                let rendered_uri = templater::evaluate_template(&exchange, uri);
                let response = self.call_endpoint(&rendered_uri, &exchange, invoker).await?;
                exchange.body = response;
                Ok(exchange)
            }

            NodeType::Enrich => {
                let uri = node.uri.as_deref().ok_or_else(|| node_error(node, route_id, "enrich requires a uri"))?;
                let rendered_uri = templater::evaluate_template(&exchange, uri);
                let response = self.call_endpoint(&rendered_uri, &exchange, invoker).await?;
                let merge = node.properties.get("mergeStrategy").and_then(Value::as_str).unwrap_or("replaceBody");
                exchange.body = match merge {
                    "merge" => merge_objects(&exchange.body, &response),
                    _ => response,
                };
                Ok(exchange)
            }

            NodeType::WireTap => {
                let uri = node.uri.as_deref().ok_or_else(|| node_error(node, route_id, "wireTap requires a uri"))?;
                let rendered_uri = templater::evaluate_template(&exchange, uri);
                let scheme = crate::compiler::uri::scheme_of(&rendered_uri).unwrap_or_default();
                let node_id = node.id.clone();
                if scheme == "direct" {
                    // `direct:` targets need the borrowed invoker, which can't
                    // outlive this call, so this one case can't be truly
                    // detached. Run inline but swallow the outcome either way.
                    if let Err(e) = self.call_endpoint(&rendered_uri, &exchange, invoker).await {
                        warn!(route_id, node_id, error = %e, "wireTap (direct) failed");
                    }
                } else {
                    let http = self.http.clone();
                    let retry = self.config.retry.clone();
                    let beans = self.beans.clone();
                    let uri_owned = rendered_uri.clone();
                    let tap_exchange = exchange.clone();
                    let route_id_owned = route_id.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = dispatch_external(http, retry, beans, &uri_owned, &tap_exchange).await {
                            warn!(route_id = route_id_owned, node_id, error = %e, "wireTap failed");
                        }
                    });
                }
                Ok(exchange)
            }

            NodeType::Debit => {
                let (account, amount, txn_id) = extract_debit_credit_params(node, &exchange)?;
                self.saga.debit(&account, amount, &txn_id).await?;
                exchange.properties.insert("transactionId".to_string(), Value::String(txn_id));
                Ok(exchange)
            }

            NodeType::Credit => {
                let (account, amount, txn_id) = extract_debit_credit_params(node, &exchange)?;
                self.saga.credit(&account, amount, &txn_id).await?;
                exchange.properties.insert("transactionId".to_string(), Value::String(txn_id));
                Ok(exchange)
            }

            NodeType::Compensate => {
                let (account, amount, txn_id) = extract_debit_credit_params(node, &exchange)?;
                self.saga.compensate(&account, amount, &txn_id, None).await?;
                Ok(exchange)
            }

            NodeType::SagaTransfer => {
                let source = templater::extract_saga_param(&exchange, &node.properties, "source", Some("sourceAccount"), Some("sourceAccount"), None)
                    .ok_or_else(|| node_error(node, route_id, "sagaTransfer requires a source account"))?;
                let dest = templater::extract_saga_param(&exchange, &node.properties, "dest", Some("destAccount"), Some("destAccount"), None)
                    .ok_or_else(|| node_error(node, route_id, "sagaTransfer requires a dest account"))?;
                let amount = templater::extract_saga_param(&exchange, &node.properties, "amount", Some("amount"), Some("amount"), None)
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| node_error(node, route_id, "sagaTransfer requires a numeric amount"))?;
                let description = templater::extract_saga_param(&exchange, &node.properties, "description", Some("description"), None, None);

                let txn_id = self.saga.execute_transfer(&source, &dest, amount, description).await?;
                exchange.properties.insert("transactionId".to_string(), Value::String(txn_id));
                Ok(exchange)
            }

            scoped @ (NodeType::Filter | NodeType::Split | NodeType::Loop | NodeType::Choice | NodeType::TryCatch | NodeType::Multicast) => {
                Err(node_error(node, route_id, &format!("{} is a scoped node type and has no inline dispatch", scoped.canonical_token())))
            }

            // Marks completion of a split group; passes the body through
            // unchanged (§4.3 "aggregate").
            NodeType::Aggregate => Ok(exchange),
        }
    }

    async fn call_endpoint(&self, uri: &str, exchange: &ExecutionExchange, invoker: &dyn DirectRouteInvoker) -> Result<Value, ExecutionError> {
        let scheme = crate::compiler::uri::scheme_of(uri).unwrap_or_default();
        match scheme.as_str() {
            "direct" => {
                let target_name = uri.split_once(':').map(|(_, rest)| rest).unwrap_or("");
                let (tenant_id, _) = crate::domain::split_internal_key(&exchange.from_route_id).unwrap_or(("default", ""));
                let key = crate::domain::internal_key(tenant_id, target_name);
                let result = invoker.invoke_direct(&key, exchange.clone()).await?;
                Ok(result.body)
            }
            _ => dispatch_external(self.http.clone(), self.config.retry.clone(), self.beans.clone(), uri, exchange).await,
        }
    }

    async fn throttle(&self, key: &str, rate_per_sec: u32) {
        loop {
            let wait = {
                let mut guard = self.throttles.lock();
                let state = guard.entry(key.to_string()).or_insert_with(|| ThrottleState { window_start: Instant::now(), count: 0 });
                let elapsed = state.window_start.elapsed();
                if elapsed >= Duration::from_secs(1) {
                    state.window_start = Instant::now();
                    state.count = 0;
                }
                if state.count < rate_per_sec {
                    state.count += 1;
                    None
                } else {
                    Some(Duration::from_secs(1).saturating_sub(elapsed))
                }
            };
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

fn node_error(node: &Node, route_id: &str, cause: &str) -> ExecutionError {
    ExecutionError::Node {
        route_id: route_id.to_string(),
        node_id: node.id.clone(),
        node_type: node.node_type.canonical_token().to_string(),
        cause: cause.to_string(),
    }
}

/// The non-`direct` endpoint dispatch logic, factored out of
/// `Executor::call_endpoint` so it can run either inline (`to`/`enrich`)
/// or detached via `tokio::spawn` (`wireTap`, which "does not wait").
/// Takes every dependency by owned value so it satisfies `'static`.
async fn dispatch_external(
    http: reqwest::Client,
    retry_config: RetryConfig,
    beans: HashMap<String, Arc<dyn BeanHandler>>,
    uri: &str,
    exchange: &ExecutionExchange,
) -> Result<Value, ExecutionError> {
    let scheme = crate::compiler::uri::scheme_of(uri).unwrap_or_default();
    match scheme.as_str() {
        "http" | "https" => {
            let body = exchange.body.clone();
            let uri_owned = uri.to_string();
            retry::retry_with_backoff(&retry_config, &uri_owned, || {
                let http = http.clone();
                let uri = uri_owned.clone();
                let body = body.clone();
                async move {
                    let response = http
                        .post(&uri)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| if e.is_timeout() { ExecutionError::Timeout(0) } else { ExecutionError::Transport(e.to_string()) })?;
                    response.json::<Value>().await.map_err(|e| ExecutionError::Transport(e.to_string()))
                }
            })
            .await
        }
        "log" => {
            let category = uri.split_once(':').map(|(_, rest)| rest).unwrap_or("route");
            info!(category, body = %exchange.body, "wire-tap/log endpoint");
            Ok(exchange.body.clone())
        }
        "bean" => {
            let (name, method) = parse_bean_uri(uri);
            let handler = beans.get(&name).ok_or_else(|| ExecutionError::UnresolvableEndpoint(uri.to_string()))?;
            let result = handler.invoke(&method, exchange.clone()).await?;
            Ok(result.body)
        }
        _ => Err(ExecutionError::UnresolvableEndpoint(uri.to_string())),
    }
}

fn parse_bean_uri(uri: &str) -> (String, String) {
    let rest = uri.split_once(':').map(|(_, r)| r).unwrap_or("");
    match rest.split_once('?') {
        Some((name, query)) => {
            let method = query
                .split('&')
                .find_map(|pair| pair.strip_prefix("method="))
                .unwrap_or("invoke")
                .to_string();
            (name.to_string(), method)
        }
        None => (rest.to_string(), "invoke".to_string()),
    }
}

/// The rendered text attached to a node's `COMPLETED` event message
/// (§8 scenario 1: `COMPLETED(log, message="hi world")`). Only `log`
/// carries a rendered message; every other node type reports `None` and
/// leans on `result` instead. `exchange` is the snapshot captured right
/// after the node's own work ran, before any child nodes mutate it.
fn node_completion_message(node: &Node, exchange: &ExecutionExchange) -> Option<String> {
    match node.node_type {
        NodeType::Log => node.message.as_deref().map(|m| templater::evaluate_template(exchange, m)),
        _ => None,
    }
}

/// Evaluates `expr` per the node's declared expression language (§6
/// "Node properties: expressionLanguage").
fn evaluate_by_language(exchange: &ExecutionExchange, expr: &str, language: ExpressionLanguage) -> Value {
    match language {
        ExpressionLanguage::Simple => templater::evaluate_expression(exchange, expr),
        ExpressionLanguage::Constant => Value::String(expr.to_string()),
        ExpressionLanguage::Jsonpath => {
            templater::resolve_body_path(&exchange.body, expr.trim_start_matches('$').trim_start_matches('.')).unwrap_or(Value::Null)
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `loop`'s fixed-count mode: a `count` property, or an `expression`
/// that parses directly as an integer literal. Returns `None` when
/// neither applies, meaning the caller should fall back to re-evaluating
/// `expression` each iteration (§4.3 "loop").
fn fixed_loop_count(node: &Node) -> Option<u32> {
    if let Some(n) = node.properties.get("count").and_then(Value::as_u64) {
        return Some(n as u32);
    }
    node.expression.as_deref().and_then(|expr| expr.trim().parse::<u32>().ok())
}

fn numeric_property_or_expression(node: &Node, exchange: &ExecutionExchange, property_key: &str) -> Option<f64> {
    if let Some(v) = node.properties.get(property_key).and_then(Value::as_f64) {
        return Some(v);
    }
    node.expression.as_deref().and_then(|expr| evaluate_by_language(exchange, expr, node.expression_language).as_f64())
}

fn convert_body(body: &Value, target_type: &str) -> Value {
    match target_type {
        "string" => Value::String(match body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }),
        "number" => match body {
            Value::Number(_) => body.clone(),
            Value::String(s) => s.parse::<f64>().ok().and_then(Value::from_f64).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "boolean" => Value::Bool(is_truthy(body)),
        "json" | "object" | "array" => match body {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| body.clone()),
            other => other.clone(),
        },
        _ => body.clone(),
    }
}

fn merge_objects(base: &Value, incoming: &Value) -> Value {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in incoming_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

fn extract_debit_credit_params(node: &Node, exchange: &ExecutionExchange) -> Result<(String, i64, String), ExecutionError> {
    let account = templater::extract_saga_param(exchange, &node.properties, "account", Some("accountNumber"), Some("account"), None)
        .ok_or_else(|| node_error(node, &exchange.from_route_id, "requires an account"))?;
    let amount = templater::extract_saga_param(exchange, &node.properties, "amount", Some("amount"), Some("amount"), None)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| node_error(node, &exchange.from_route_id, "requires a numeric amount"))?;
    let txn_id = templater::extract_saga_param(exchange, &node.properties, "transactionId", Some("transactionId"), Some("transactionId"), None)
        .ok_or_else(|| node_error(node, &exchange.from_route_id, "requires a transactionId"))?;
    Ok((account, amount, txn_id))
}
