use flow_core::{pipeline_hash, InMemoryRunStore, NewRun, Pipeline, RunStore, StepStatus, LOCKED_PIPELINE};

#[test]
fn created_run_mirrors_locked_pipeline() {
    let store = InMemoryRunStore::new();
    let pipeline = Pipeline::locked();
    let run_id = store.create_run(&NewRun::manual("ana@example.com"), &pipeline).unwrap();

    let run = store.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.pipeline_hash, pipeline.hash());

    let steps = store.load_steps(run_id).unwrap();
    assert_eq!(steps.len(), LOCKED_PIPELINE.len());
    for (step, entry) in steps.iter().zip(LOCKED_PIPELINE) {
        assert_eq!(step.step_key, entry.step_key);
        assert_eq!(step.handler_key, entry.handler_key);
        assert_eq!(step.status, StepStatus::Pending);
    }
}

#[test]
fn locked_pipeline_hash_is_stable() {
    // Cambiar el orden o las claves del pipeline cambia este hash; los runs
    // existentes guardan el valor con el que fueron sembrados.
    let a = Pipeline::locked().hash();
    let b = Pipeline::default().hash();
    assert_eq!(a, b);
    assert_eq!(a, pipeline_hash());
    assert_eq!(a.len(), 64);
    let reordered = Pipeline::from_pairs(&[("DEALS", "a2"),
                                           ("STYLE_BRIEF", "stylist"),
                                           ("BRAND_SEARCH", "a1"),
                                           ("RANK", "ranker"),
                                           ("TRYON", "tryon"),
                                           ("CHECKOUT_DRAFT", "checkout")]);
    assert_ne!(a, reordered.hash());
}
