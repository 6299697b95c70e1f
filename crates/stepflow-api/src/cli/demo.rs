//! `stepflow demo`: a built-in order saga.
//!
//! Top-level steps:
//! 1. `reserve_inventory` -- reserves every line item (compensating)
//! 2. `charge_payment` -- charges the order total (compensating)
//! 3. `ship_order` -- books a carrier under a timeout
//! 4. `notify_customer` -- sends a confirmation; failures are caught
//!
//! `--fail-at <step>` injects a fault into the named step, `--compensate`
//! turns on the saga rollback, `--cancel` cancels the run while the carrier
//! booking is in flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;
use serde_json::{Value, json};
use stepflow_core::event::EventBus;
use stepflow_core::workflow::{
    BoxMiddleware, BoxStep, BroadcastObserver, CompensatingStep, FnStep, ForEachStep,
    RETRY_ATTEMPT, RetryStep, Step, StepError, TRY_CATCH_ERROR, TimeoutStep, TracingMiddleware,
    TracingObserver, TryCatchStep, WorkflowContext, WorkflowEngine, WorkflowObserver,
    WorkflowResult,
};
use stepflow_types::config::HostConfig;
use stepflow_types::workflow::WorkflowStatus;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Names of the saga's top-level steps, in execution order.
pub const SAGA_STEPS: [&str; 4] = [
    "reserve_inventory",
    "charge_payment",
    "ship_order",
    "notify_customer",
];

const FAIL_AT_KEY: &str = "demo.fail_at";
const CARRIER_LATENCY: Duration = Duration::from_millis(200);
const SHIPPING_LIMIT: Duration = Duration::from_secs(5);

#[derive(Args, Debug, Clone, Default)]
pub struct DemoArgs {
    /// Inject a fault into this step.
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(SAGA_STEPS))]
    pub fail_at: Option<String>,

    /// Roll back completed steps when one fails (overrides the config file).
    #[arg(long)]
    pub compensate: bool,

    /// Cancel the run while the order is being shipped.
    #[arg(long)]
    pub cancel: bool,
}

/// Domain fault raised by saga steps.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("fault injected into '{0}'")]
    Injected(String),

    #[error("order has no line items")]
    EmptyOrder,
}

fn check_injected(ctx: &WorkflowContext, step: &str) -> Result<(), StepError> {
    match ctx.get(FAIL_AT_KEY) {
        Some(Value::String(target)) if target == step => {
            Err(anyhow::Error::new(OrderError::Injected(step.to_string())).into())
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Saga steps
// ---------------------------------------------------------------------------

struct ReserveInventory {
    body: ForEachStep,
}

impl ReserveInventory {
    fn new() -> Self {
        let reserve_line = FnStep::new("reserve_line", |ctx: WorkflowContext| async move {
            let sku = ctx
                .get(stepflow_core::workflow::FOR_EACH_CURRENT)
                .and_then(|item| item.get("sku").cloned())
                .unwrap_or(Value::Null);
            let mut reserved = ctx
                .get("inventory.reserved")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            reserved.push(sku);
            ctx.set("inventory.reserved", Value::Array(reserved));
            Ok(())
        });
        let body = ForEachStep::from_source(
            "reserve_lines",
            |ctx: &WorkflowContext| {
                ctx.get("order.items")
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default()
            },
            BoxStep::new(reserve_line),
        );
        Self { body }
    }
}

impl Step for ReserveInventory {
    fn name(&self) -> &str {
        "reserve_inventory"
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        let has_items = ctx
            .get("order.items")
            .and_then(|v| v.as_array().map(|items| !items.is_empty()))
            .unwrap_or(false);
        if !has_items {
            return Err(anyhow::Error::new(OrderError::EmptyOrder).into());
        }
        self.body.execute(ctx).await?;
        check_injected(ctx, self.name())
    }
}

impl CompensatingStep for ReserveInventory {
    async fn compensate(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        if let Some(reserved) = ctx.remove("inventory.reserved") {
            ctx.set("inventory.released", reserved);
        }
        Ok(())
    }
}

struct ChargePayment;

impl Step for ChargePayment {
    fn name(&self) -> &str {
        "charge_payment"
    }

    async fn execute(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        check_injected(ctx, self.name())?;
        let total = ctx.get("order.total").unwrap_or(json!(0));
        ctx.set("payment.charged", total);
        Ok(())
    }
}

impl CompensatingStep for ChargePayment {
    async fn compensate(&self, ctx: &WorkflowContext) -> Result<(), StepError> {
        if let Some(charged) = ctx.remove("payment.charged") {
            ctx.set("payment.refunded", charged);
        }
        Ok(())
    }
}

fn ship_order() -> BoxStep {
    let book_carrier = FnStep::new("book_carrier", |ctx: WorkflowContext| async move {
        tokio::select! {
            _ = ctx.cancellation().cancelled() => return Err(StepError::Cancelled),
            _ = tokio::time::sleep(CARRIER_LATENCY) => {}
        }
        check_injected(&ctx, "ship_order")?;
        let tracking = format!("TRK-{}", &ctx.workflow_id().simple().to_string()[..8]);
        ctx.set("shipment.tracking", json!(tracking));
        Ok(())
    });
    BoxStep::new(TimeoutStep::new(
        "ship_order",
        BoxStep::new(book_carrier),
        SHIPPING_LIMIT,
    ))
}

fn notify_customer() -> BoxStep {
    let send_email = FnStep::new("send_email", |ctx: WorkflowContext| async move {
        check_injected(&ctx, "notify_customer")?;
        ctx.set("notification.sent", json!(true));
        Ok(())
    });
    let record_failure = FnStep::new("record_failure", |ctx: WorkflowContext| async move {
        ctx.set("notification.sent", json!(false));
        Ok(())
    });
    let stamp = FnStep::new("stamp", |ctx: WorkflowContext| async move {
        ctx.set("notification.attempted", json!(true));
        Ok(())
    });

    BoxStep::new(
        TryCatchStep::new(
            "notify_customer",
            BoxStep::new(RetryStep::new("send_email_retry", BoxStep::new(send_email), 2)),
        )
        .catch::<StepError>(BoxStep::new(record_failure))
        .finally(BoxStep::new(stamp)),
    )
}

fn saga_steps() -> Vec<BoxStep> {
    vec![
        BoxStep::compensating(ReserveInventory::new()),
        BoxStep::compensating(ChargePayment),
        ship_order(),
        notify_customer(),
    ]
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

/// Outcome of one saga run, with the lifecycle events it emitted.
pub struct SagaRun {
    pub result: WorkflowResult,
    pub events: Vec<String>,
}

/// Seed the order, build the engine and run it.
pub async fn run_order_saga(args: &DemoArgs, config: &HostConfig) -> Result<SagaRun> {
    let mut engine_config = config.engine.clone();
    if args.compensate {
        engine_config.enable_compensation = true;
    }

    let bus = EventBus::from_config(&engine_config);
    let mut events_rx = bus.subscribe();
    let observers: Vec<Arc<dyn WorkflowObserver>> = vec![
        Arc::new(TracingObserver),
        Arc::new(BroadcastObserver::new(bus)),
    ];

    let engine = WorkflowEngine::new(
        "order_saga",
        saga_steps(),
        vec![BoxMiddleware::new(TracingMiddleware)],
        observers,
        engine_config,
    )?;

    let token = CancellationToken::new();
    let ctx = WorkflowContext::new().with_cancellation(token.clone());
    ctx.set("order.id", json!("ORD-1001"));
    ctx.set(
        "order.items",
        json!([
            {"sku": "KB-001", "qty": 1},
            {"sku": "MS-042", "qty": 2},
        ]),
    );
    ctx.set("order.total", json!(129.5));
    if let Some(step) = &args.fail_at {
        ctx.set(FAIL_AT_KEY, json!(step));
    }

    if args.cancel {
        tokio::spawn(async move {
            tokio::time::sleep(CARRIER_LATENCY / 2).await;
            token.cancel();
        });
    }

    let result = engine.execute(ctx).await?;

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event.kind().to_string());
    }

    Ok(SagaRun { result, events })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ErrorReport {
    step: String,
    message: String,
    occurred_at: String,
}

#[derive(Serialize)]
struct DemoReport {
    workflow_id: String,
    correlation_id: String,
    status: WorkflowStatus,
    elapsed_ms: u64,
    completed_steps: Vec<String>,
    properties: BTreeMap<String, Value>,
    errors: Vec<ErrorReport>,
    events: Vec<String>,
}

impl DemoReport {
    fn from_run(run: &SagaRun) -> Self {
        let ctx = &run.result.context;
        Self {
            workflow_id: ctx.workflow_id().to_string(),
            correlation_id: ctx.correlation_id().to_string(),
            status: run.result.status,
            elapsed_ms: run.result.elapsed.as_millis() as u64,
            completed_steps: run.result.completed_steps.clone(),
            properties: ctx.properties().into_iter().collect(),
            errors: run
                .result
                .errors()
                .iter()
                .map(|e| ErrorReport {
                    step: e.step_name.clone(),
                    message: e.message(),
                    occurred_at: e.occurred_at.to_rfc3339(),
                })
                .collect(),
            events: run.events.clone(),
        }
    }
}

fn styled_status(status: WorkflowStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        WorkflowStatus::Completed => style(text).green(),
        WorkflowStatus::Compensated => style(text).yellow(),
        WorkflowStatus::Aborted => style(text).dim(),
        _ => style(text).red(),
    }
}

/// Handle `stepflow demo`.
pub async fn handle_demo(
    args: DemoArgs,
    config: &HostConfig,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let run = run_order_saga(&args, config).await?;
    let report = DemoReport::from_run(&run);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report);
    }

    if report.status == WorkflowStatus::Faulted {
        bail!("order saga faulted");
    }
    Ok(())
}

fn print_report(report: &DemoReport) {
    println!();
    println!(
        "  {} order_saga {} in {}ms",
        style("▶").bold(),
        styled_status(report.status).bold(),
        report.elapsed_ms
    );
    println!("  {}", style(format!("workflow {}", report.workflow_id)).dim());
    println!();

    let mut steps = Table::new();
    steps
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Step").fg(Color::Cyan), Cell::new("Outcome")]);
    for name in SAGA_STEPS {
        let outcome = if report.completed_steps.iter().any(|s| s == name) {
            Cell::new("completed").fg(Color::Green)
        } else if report.errors.iter().any(|e| e.step == name) {
            Cell::new("failed").fg(Color::Red)
        } else {
            Cell::new("not run").fg(Color::DarkGrey)
        };
        steps.add_row(vec![Cell::new(name), outcome]);
    }
    println!("{steps}");
    println!();

    let mut props = Table::new();
    props
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Property").fg(Color::Cyan), Cell::new("Value")]);
    for (key, value) in &report.properties {
        props.add_row(vec![Cell::new(key), Cell::new(value.to_string())]);
    }
    println!("{props}");

    if !report.errors.is_empty() {
        println!();
        for error in &report.errors {
            println!(
                "  {} {}: {}",
                style("✗").red(),
                style(&error.step).bold(),
                error.message
            );
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
