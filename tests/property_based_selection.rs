// Property-Based Testing for criteria extraction and agent selection
// Extraction must be a pure function of the task; selection must be a strict AND

use agent_reach::cache::{CacheKey, ManualClock, MokaValidationStore};
use agent_reach::criteria::{criteria_strings, extract};
use agent_reach::{
    AgentSelector, ProbeRegistry, TaskParameter, TaskType, ValidationCache, ValidationRequest,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const AGENTS: [&str; 4] = ["agent-0", "agent-1", "agent-2", "agent-3"];
const CRITERIA: [&str; 3] = ["db.internal:5432", "https://api.example.com/", "ssh.example.com:22"];

#[derive(Debug, Clone, Arbitrary)]
struct Verdict {
    #[proptest(strategy = "0usize..4")]
    agent: usize,
    #[proptest(strategy = "0usize..3")]
    criterion: usize,
    validated: bool,
}

fn host_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,9}(\\.[a-z]{2,5}){1,2}"
}

fn path_strategy() -> impl Strategy<Value = String> {
    "(/[a-z0-9]{1,8}){0,3}"
}

fn selector(cache: ValidationCache) -> AgentSelector {
    AgentSelector::new(cache, Arc::new(ProbeRegistry::new()), Duration::from_secs(3600))
}

proptest! {
    #[test]
    fn prop_socket_extraction_is_deterministic(host in host_strategy(), port in 1u16.., agent in "[a-z]{1,8}") {
        let build = |agent_id: &str| ValidationRequest::new(
            TaskType::SocketCheck,
            vec![TaskParameter::Socket { host: host.clone(), port }],
            "acct-1",
            agent_id,
        );

        let first = criteria_strings(&extract(&build(&agent)).unwrap());
        let second = criteria_strings(&extract(&build("someone-else")).unwrap());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, vec![format!("{}:{}", host, port)]);
    }

    #[test]
    fn prop_url_extraction_ignores_cosmetic_differences(host in host_strategy(), path in path_strategy()) {
        let canonical = ValidationRequest::new(
            TaskType::HttpCheck,
            vec![TaskParameter::Http { url: format!("https://{host}{path}") }],
            "acct-1",
            "agent-1",
        );
        let shouting = ValidationRequest::new(
            TaskType::HttpCheck,
            vec![TaskParameter::Http { url: format!("  HTTPS://{}:443{}/?q=1#top ", host.to_uppercase(), path) }],
            "acct-1",
            "agent-1",
        );

        prop_assert_eq!(
            criteria_strings(&extract(&canonical).unwrap()),
            criteria_strings(&extract(&shouting).unwrap())
        );
    }
}

#[test]
fn prop_selection_is_and_over_latest_verdicts() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec(any::<Verdict>(), 0..24),
                prop::collection::btree_set(0usize..3, 1..=3),
            ),
            |(verdicts, wanted)| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()));
                    let ttl = Duration::from_secs(86_400);
                    let cache = ValidationCache::new(Arc::new(MokaValidationStore::new(1_000, ttl)), ttl)
                        .with_clock(clock.clone());

                    let mut latest: HashMap<(usize, usize), bool> = HashMap::new();
                    for verdict in &verdicts {
                        let key = CacheKey::new("acct-1", AGENTS[verdict.agent], CRITERIA[verdict.criterion]);
                        cache
                            .put(cache.stamp(key, verdict.validated, Duration::ZERO))
                            .await
                            .unwrap();
                        latest.insert((verdict.agent, verdict.criterion), verdict.validated);
                    }

                    let criteria: Vec<String> = wanted.iter().map(|&c| CRITERIA[c].to_string()).collect();
                    let candidates: Vec<String> = AGENTS.iter().map(|a| a.to_string()).collect();
                    let capable = selector(cache)
                        .select_capable_agents("acct-1", &criteria, &candidates, None)
                        .await
                        .unwrap();

                    let expected: Vec<String> = (0..AGENTS.len())
                        .filter(|&agent| wanted.iter().all(|&c| latest.get(&(agent, c)) == Some(&true)))
                        .map(|agent| AGENTS[agent].to_string())
                        .collect();
                    prop_assert_eq!(capable, expected);
                    Ok(())
                })
            },
        )
        .unwrap();
}
