// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed children: reorders move existing nodes instead of recreating them.
//!
//! Run with `RUST_LOG=info cargo run --example keyed_list` to see each move.

use understory_demos::{NodeId, TerminalDom, init_logging};
use understory_reconciler::scheduler::WorkQueue;
use understory_reconciler::{Element, ReconcileError, Reconciler, ReconcilerConfig};

fn list(items: &[&'static str]) -> Element {
    Element::host("ul").with_children(items.iter().map(|&item| {
        Element::host("li")
            .with_key(item)
            .with_child(Element::text(item))
    }))
}

fn main() -> Result<(), ReconcileError> {
    init_logging();

    let mut root = Reconciler::create_root(
        TerminalDom::default(),
        WorkQueue::new(),
        NodeId::ROOT,
        ReconcilerConfig::default(),
    );

    let steps: [&[&'static str]; 4] = [
        &["apple", "banana", "cherry", "damson"],
        &["damson", "apple", "banana", "cherry"],
        &["damson", "cherry", "elder"],
        &["elder", "damson"],
    ];
    for items in steps {
        let before = root.host().mutations();
        root.render(Some(list(items)))?;
        root.act()?;
        println!(
            "{items:?}: {} container mutations",
            root.host().mutations() - before
        );
        print!("{}", root.host().to_markup());
    }
    Ok(())
}
