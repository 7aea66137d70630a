//! counter - weft on the tokio timer host.
//!
//! This demo shows:
//! - state and reducers updated from event handlers
//! - an urgent click overtaking a pending background update
//! - layout and passive effects with cleanups
//! - use_context for shared configuration

use std::cell::RefCell;
use std::rc::Rc;
use weft::prelude::*;

/// Label style shared through context.
#[derive(Clone)]
struct Theme {
    label: &'static str,
}

#[derive(Clone, Copy)]
enum Step {
    Increment,
    Reset,
}

fn apply(count: &i64, step: &Step) -> i64 {
    match step {
        Step::Increment => count + 1,
        Step::Reset => 0,
    }
}

#[derive(Default)]
struct Controls {
    step: Option<Dispatch<Step>>,
    history: Option<SetState<Vec<i64>>>,
}

fn counter(
    controls: Rc<RefCell<Controls>>,
) -> impl Fn(&mut RenderContext<'_>) -> Result<String, HookError> {
    move |cx: &mut RenderContext<'_>| -> Result<String, HookError> {
        let (count, step) = cx.use_reducer(apply, 0, None)?;
        let (history, set_history) = cx.use_state(Vec::<i64>::new)?;
        let theme = cx.use_context::<Theme>();
        let renders = cx.use_ref(|| 0u32)?;
        *renders.borrow_mut() += 1;

        cx.use_layout_effect(
            move || tracing::debug!(count, "layout committed"),
            Some(count),
        )?;
        cx.use_effect_cleanup(
            move || {
                tracing::info!(count, "count is visible");
                move || tracing::debug!(count, "count replaced")
            },
            Some(count),
        )?;

        let mut slots = controls.borrow_mut();
        slots.step = Some(step);
        slots.history = Some(set_history);

        let label = theme.map_or("count", |theme| theme.label);
        Ok(format!(
            "{label}: {count} (history {history:?}, render #{})",
            renders.get()
        ))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    weft::init_logging();

    let host = timer_host_or_manual(TimerHostConfig::default());
    let runtime = Runtime::new(
        Scheduler::with_host(host.host(), SchedulerConfig::default()),
        RuntimeConfig::default(),
    );
    runtime.provide_context(Theme { label: "clicks" });

    let controls = Rc::new(RefCell::new(Controls::default()));
    let handle = match runtime.mount(counter(controls.clone())) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(%err, "mount failed");
            return;
        }
    };
    tracing::info!(output = %handle.output(), "mounted");

    let click_controls = controls.clone();
    let click = runtime.events().register(move || {
        if let Some(step) = click_controls.borrow().step.as_ref() {
            step.dispatch(Step::Increment);
        }
    });

    // A background snapshot at normal priority, then two clicks that render
    // ahead of it.
    let snapshot_controls = controls.clone();
    let snapshot_handle = handle.clone();
    runtime.scheduler().run_with_priority(Priority::Normal, || {
        if let Some(history) = snapshot_controls.borrow().history.as_ref() {
            let seen = snapshot_handle.output();
            history.update(move |entries| {
                let mut entries = entries.clone();
                entries.push(seen.len() as i64);
                entries
            });
        }
    });
    runtime.events().dispatch(click);
    runtime.events().dispatch(click);
    host.run_until_idle(runtime.scheduler()).await;
    tracing::info!(output = %handle.output(), "after clicks");

    let reset_controls = controls.clone();
    let reset = runtime
        .events()
        .register_with_priority(Priority::Immediate, move || {
            if let Some(step) = reset_controls.borrow().step.as_ref() {
                step.dispatch(Step::Reset);
            }
        });
    runtime.events().dispatch(reset);
    tracing::info!(output = %handle.output(), "after reset");

    host.run_until_idle(runtime.scheduler()).await;
    for err in runtime.take_errors() {
        tracing::error!(%err, "render failed");
    }
    runtime.unmount(&handle);
}
