// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A counter component: state, an effect, and discrete (sync) updates.
//!
//! Run with `RUST_LOG=understory_reconciler=debug cargo run --example counter`.

use std::cell::RefCell;
use std::rc::Rc;

use understory_demos::{NodeId, TerminalDom, init_logging};
use understory_reconciler::hooks::EffectCleanup;
use understory_reconciler::scheduler::WorkQueue;
use understory_reconciler::{
    Component, Element, Priority, ReconcileError, Reconciler, ReconcilerConfig, StateSetter,
};

fn main() -> Result<(), ReconcileError> {
    init_logging();

    let setter: Rc<RefCell<Option<StateSetter<i64>>>> = Rc::default();
    let setter_slot = Rc::clone(&setter);
    let counter = Component::new("Counter", move |hooks, _| {
        let (count, set) = hooks.use_state(|| 0_i64);
        *setter_slot.borrow_mut() = Some(set);
        hooks.use_effect(
            move || {
                println!("effect: count is now {count}");
                Some(Box::new(move || println!("cleanup: leaving {count}")) as EffectCleanup)
            },
            Some(vec![count.into()]),
        );
        Element::host("div")
            .with_attr("class", "counter")
            .with_child(Element::text(format!("Clicked {count} times")))
    });

    let mut root = Reconciler::create_root(
        TerminalDom::default(),
        WorkQueue::new(),
        NodeId::ROOT,
        ReconcilerConfig::default(),
    );
    root.render(Some(Element::component(&counter)))?;
    root.act()?;
    print!("{}", root.host().to_markup());

    for _ in 0..3 {
        let Some(set) = setter.borrow().clone() else {
            break;
        };
        // A click is discrete input: it lands on the sync lane.
        root.run_with_priority(Priority::Immediate, |_| set.update(|n| n + 1));
        if root.host_mut().take_microtask() {
            root.flush_sync_work()?;
        }
        root.flush_passive_effects()?;
        print!("{}", root.host().to_markup());
    }

    root.unmount()?;
    println!("{} container mutations", root.host().mutations());
    Ok(())
}
