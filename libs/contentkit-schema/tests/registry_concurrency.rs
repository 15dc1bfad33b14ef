//! Readers racing a writer must only ever see whole generations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use contentkit_schema::{Field, ResourceDef, SchemaRegistry};

const FIELDS_PER_GENERATION: usize = 8;
const SWAPS: usize = 200;

/// Every non-id field of `post` is tagged with the writer's round number.
fn post_for_round(round: usize) -> Vec<ResourceDef> {
    let mut def = ResourceDef::new("post");
    for i in 0..FIELDS_PER_GENERATION {
        def = def.field(Field::string(format!("f{i}_r{round}")));
    }
    vec![def, ResourceDef::new(format!("marker_r{round}"))]
}

fn round_of(field_name: &str) -> &str {
    field_name.rsplit_once("_r").map_or("", |(_, r)| r)
}

#[test]
fn concurrent_resolve_never_mixes_generations() {
    let registry = Arc::new(SchemaRegistry::new(post_for_round(0)).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0usize;
                let mut last_generation = registry.current_generation();
                loop {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.generation() >= last_generation);
                    last_generation = snapshot.generation();

                    let post = snapshot.resolve("post").unwrap();
                    let rounds: Vec<&str> = post
                        .fields()
                        .iter()
                        .skip(1)
                        .map(|f| round_of(&f.name))
                        .collect();
                    assert_eq!(rounds.len(), FIELDS_PER_GENERATION);
                    assert!(
                        rounds.iter().all(|r| *r == rounds[0]),
                        "mixed fields within one resource: {rounds:?}"
                    );
                    // The sibling resource must come from the same generation too.
                    assert!(snapshot.contains(&format!("marker_r{}", rounds[0])));
                    observed += 1;
                    if done.load(Ordering::Acquire) {
                        break;
                    }
                }
                observed
            })
        })
        .collect();

    for round in 1..=SWAPS {
        registry.replace(post_for_round(round)).unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(registry.current_generation().get(), 1 + SWAPS as u64);
}
