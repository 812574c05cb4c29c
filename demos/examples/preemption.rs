// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A time-sliced transition render interrupted by a sync update.
//!
//! The transition renders a few fibers per slice. Midway, a discrete update
//! arrives on the sync lane: it renders and commits first, then the
//! transition restarts on top of it and both updates end up applied.
//!
//! Run with `RUST_LOG=understory_reconciler=debug cargo run --example preemption`.

use std::cell::RefCell;
use std::rc::Rc;

use understory_demos::{NodeId, TerminalDom, init_logging};
use understory_reconciler::scheduler::WorkQueue;
use understory_reconciler::{
    Component, Element, Priority, ReconcileError, Reconciler, ReconcilerConfig, StateSetter,
};

#[derive(Clone, Debug, Default)]
struct Model {
    filter: String,
    selected: usize,
}

fn main() -> Result<(), ReconcileError> {
    init_logging();

    let setter: Rc<RefCell<Option<StateSetter<Model>>>> = Rc::default();
    let setter_slot = Rc::clone(&setter);
    let app = Component::new("Search", move |hooks, _| {
        let (model, set) = hooks.use_state(Model::default);
        *setter_slot.borrow_mut() = Some(set);
        let rows = (0..12).map(|i| {
            let label = format!("{}{i}", model.filter);
            Element::host("li")
                .with_key(i)
                .with_attr("selected", i == model.selected)
                .with_child(Element::text(label))
        });
        Element::host("ul").with_children(rows)
    });

    let mut root = Reconciler::create_root(
        TerminalDom::default(),
        WorkQueue::with_slice(5),
        NodeId::ROOT,
        ReconcilerConfig::default(),
    );
    root.render(Some(Element::component(&app)))?;
    root.act()?;

    let Some(set) = setter.borrow().clone() else {
        return Ok(());
    };

    root.start_transition(|_| {
        set.update(|model| Model {
            filter: "item-".into(),
            ..model.clone()
        });
    });
    root.run_next_task()?;
    println!(
        "transition yielded after one slice ({} yields so far)",
        root.scheduler().yield_count()
    );

    root.run_with_priority(Priority::Immediate, |_| {
        set.update(|model| Model {
            selected: 3,
            ..model.clone()
        });
    });
    if root.host_mut().take_microtask() {
        root.flush_sync_work()?;
    }
    println!("after the sync commit:");
    print!("{}", root.host().to_markup());

    root.act()?;
    println!("after the transition finished:");
    print!("{}", root.host().to_markup());
    Ok(())
}
