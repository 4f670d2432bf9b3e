//! Scenario files on disk

use std::io::Write;

use qnet_simulation::{ScenarioConfig, SimError};

#[test]
fn test_run_from_file() {
    let path = std::env::temp_dir().join(format!("qnet-scenario-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{
            "network": {{ "seed": 5, "end_time_secs": 0.02, "link": {{ "alpha_db_per_km": 0.0 }} }},
            "topology": {{
                "nodes": [{{ "name": "A" }}, {{ "name": "B" }}],
                "channels": [{{ "a": "A", "b": "B", "length_km": 5.0, "qubits": [2, 2], "link_arch": "sim" }}]
            }},
            "requests": [{{ "src": "A", "dst": "B" }}]
        }}"#
    )
    .unwrap();
    drop(file);

    let scenario = ScenarioConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    let report = scenario.run().unwrap();
    assert_eq!(report.seed, 5);
    assert!(report.paths[0].e2e_pairs > 0);
}

#[test]
fn test_unknown_request_node() {
    let text = r#"{
        "topology": { "nodes": [{ "name": "A" }, { "name": "B" }],
                      "channels": [{ "a": "A", "b": "B", "length_km": 1.0, "qubits": [1, 1] }] },
        "requests": [{ "src": "A", "dst": "Z" }]
    }"#;
    let scenario = ScenarioConfig::from_json(text).unwrap();
    assert!(matches!(scenario.build(), Err(SimError::UnknownNode(_))));
}
