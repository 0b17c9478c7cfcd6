use std::collections::HashSet;

use flow_core::{ArtifactReader, InMemoryDispatcher, InMemoryRunStore, NewRun, Orchestrator, Pipeline, RunStatus,
                RunStore, StepExecutor, StepStatus, StepTask};
use flow_handlers::artifacts::{BrandSearch, CheckoutDraft, Deals, Ranking, StyleBrief, Tryon};
use flow_handlers::offline_registry;
use flow_handlers::steps::checkout::{checkout_url, encode_query};
use flow_handlers::steps::deals::{discount_pct, synthetic_deals};
use flow_handlers::steps::rank::score;
use flow_handlers::steps::style_brief::onboarding_brief;
use serde_json::Value;
use uuid::Uuid;

fn run_locked_pipeline() -> (InMemoryRunStore, Uuid) {
    let store = InMemoryRunStore::new();
    let run_id = store.create_run(&NewRun::manual("ana@example.com"), &Pipeline::locked()).unwrap();
    let dispatcher = InMemoryDispatcher::new();
    let orch = Orchestrator::new(store.clone(), dispatcher.clone());
    let exec = StepExecutor::new(store.clone(), offline_registry());
    for _ in 0..20 {
        orch.run_cycle().unwrap();
        while let Some(task) = dispatcher.pop() {
            exec.execute_step(&task);
        }
        if store.get_run(run_id).unwrap().unwrap().status.is_terminal() {
            break;
        }
    }
    (store, run_id)
}

fn artifact<T: for<'de> serde::Deserialize<'de>>(store: &InMemoryRunStore, run_id: Uuid, kind: &str) -> T {
    let raw: Value = store.latest_artifact(run_id, kind).unwrap().unwrap_or_else(|| panic!("artifact {kind}"));
    serde_json::from_value(raw).unwrap()
}

#[test]
fn locked_pipeline_runs_end_to_end_offline() {
    let (store, run_id) = run_locked_pipeline();
    let report = store.run_report(run_id).unwrap().unwrap();
    assert_eq!(report.run.status, RunStatus::Succeeded);
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(report.artifacts.iter().map(|a| a.kind.as_str()).collect::<Vec<_>>(),
               vec!["style_brief", "deals", "brand_search", "rank", "tryon", "checkout_draft"]);

    let brief: StyleBrief = artifact(&store, run_id, "style_brief");
    assert_eq!(brief, onboarding_brief());
    assert!(brief.requires_drive_connection);

    let deals: Deals = artifact(&store, run_id, "deals");
    assert_eq!(deals.brands_scanned, vec!["Zara", "H&M", "Mango"]);
    assert_eq!(deals.deals.iter().map(|d| d.discount_pct).collect::<Vec<_>>(), vec![37, 13, 13]);
    assert_eq!(deals.deals.iter().map(|d| d.sale_end_in_days).collect::<Vec<_>>(), vec![6, 5, 2]);

    let search: BrandSearch = artifact(&store, run_id, "brand_search");
    assert_eq!(search.product_candidates.len(), 6);
    let first = &search.product_candidates[0];
    assert_eq!(first.sku, "zara-dre-11");
    assert_eq!(first.color, "navy");
    assert_eq!(first.price, 55.0);
    assert_eq!(first.sale_price, 34.65);
    assert_eq!(search.product_candidates[5].sku, "mango-top-32");
    assert_eq!(search.product_candidates[5].color, "navy");

    let ranking: Ranking = artifact(&store, run_id, "rank");
    let scores: Vec<f64> = ranking.ranked_items.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(ranking.ranked_items[0].candidate.sku, "zara-dre-11");
    assert!((scores[0] - 0.7531).abs() < 1e-9);

    let tryon: Tryon = artifact(&store, run_id, "tryon");
    assert_eq!(tryon.tryon_results.len(), 4);
    assert!(tryon.tryon_results.iter().all(|t| t.status == "draft"));
    assert!(tryon.tryon_results[0].preview_prompt.starts_with("Overlay a navy dress from Zara"));

    let checkout: CheckoutDraft = artifact(&store, run_id, "checkout_draft");
    assert!(checkout.checkout_draft.approval_required);
    assert_eq!(checkout.checkout_draft.items.len(), 3);
    assert_eq!(checkout.checkout_draft.items[0].checkout_url,
               "https://www.google.com/search?q=Zara+zara-dre-11+buy");
    assert!(checkout.checkout_draft.items.iter().all(|i| i.qty == 1));
}

#[test]
fn offline_handlers_are_deterministic() {
    let (s1, r1) = run_locked_pipeline();
    let (s2, r2) = run_locked_pipeline();
    let hashes = |store: &InMemoryRunStore, run_id| -> Vec<String> {
        store.artifacts_for(run_id).unwrap().into_iter().map(|a| a.payload_hash).collect()
    };
    assert_eq!(hashes(&s1, r1), hashes(&s2, r2));
}

#[test]
fn downstream_handler_without_upstream_artifact_fails() {
    let store = InMemoryRunStore::new();
    let run_id = store.create_run(&NewRun::manual("ana@example.com"), &Pipeline::locked()).unwrap();
    let rank_step = store.load_steps(run_id).unwrap().into_iter().find(|s| s.step_key == "RANK").unwrap();
    let exec = StepExecutor::new(store.clone(), offline_registry());
    let outcome = exec.execute_step(&StepTask::for_step(&rank_step));
    assert_eq!(outcome.status, StepStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("missing artifact 'style_brief'"));
}

#[test]
fn deal_formula_uses_lowercased_brand() {
    assert_eq!(discount_pct("Zara"), discount_pct("ZARA"));
    assert_eq!(discount_pct("Zara"), 37);
    let deals = synthetic_deals(&["A", "B", "C", "D", "E", "F"].map(String::from));
    assert_eq!(deals.brands_scanned.len(), 5);
    assert!(deals.deals.iter().all(|d| (10..=40).contains(&d.discount_pct)));
}

#[test]
fn score_rewards_palette_and_caps_discount() {
    let search: BrandSearch = serde_json::from_value(serde_json::json!({
        "product_candidates": [{
            "sku": "x-dre-11", "title": "X dress", "brand": "X", "category": "dress", "color": "Navy",
            "price": 300.0, "sale_price": 240.0, "discount_pct": 80.0,
            "source": "synthetic", "data_source": "mock"
        }],
        "data_mode": "mock", "provider": "synthetic"
    }))
    .unwrap();
    let candidate = &search.product_candidates[0];
    let palette: HashSet<String> = ["navy".to_string()].into_iter().collect();
    // Sobre presupuesto: sólo cuentan el descuento (tope 1.0) y la paleta.
    assert_eq!(score(candidate, 120.0, &palette), 0.55);
    assert_eq!(score(candidate, 120.0, &HashSet::new()), 0.45);
}

#[test]
fn checkout_url_prefers_product_url_and_encodes_search() {
    assert_eq!(checkout_url(Some("https://shop.example/p/1"), "Zara", "zara-dre-11"),
               "https://shop.example/p/1");
    assert_eq!(encode_query("H&M h&m-dre-21 buy"), "H%26M+h%26m-dre-21+buy");
    assert_eq!(checkout_url(None, "H&M", "h&m-dre-21"),
               "https://www.google.com/search?q=H%26M+h%26m-dre-21+buy");
}
