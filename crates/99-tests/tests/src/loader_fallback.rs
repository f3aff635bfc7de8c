use std::rc::Rc;
use std::time::Duration;

use mock::{HostOp, MockAssetHost, Outcome};
use proptest::collection;
use proptest::prelude::*;
use runtime_native::LocalDriver;
use script_loader::{AssetSpec, LoadSource, ScriptLoader};

const ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

fn failing_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Fail("503".into())),
        Just(Outcome::Hang),
        (1u64..400).prop_map(|ms| Outcome::FailAfter(Duration::from_millis(ms), "reset".into())),
    ]
}

proptest! {
    /// With the last of N candidates healthy, the load succeeds through it after N-1 cleaned-up failures.
    #[test]
    fn nth_candidate_succeeds_after_n_minus_one_failures(
        failing in collection::vec(failing_outcome(), 0..6),
    ) {
        let n = failing.len() + 1;
        let mut driver = LocalDriver::new();
        let host = Rc::new(MockAssetHost::new(driver.shared_timers()));
        let loader = ScriptLoader::new(host.clone(), driver.shared_timers());

        let urls: Vec<String> = (0..n).map(|i| format!("https://cdn{i}.example/lib.js")).collect();
        for (url, outcome) in urls.iter().zip(failing) {
            host.set_outcome(url, outcome);
        }
        host.set_outcome(&urls[n - 1], Outcome::LoadAfter(Duration::from_millis(10)));
        let spec = AssetSpec::new("lib", urls.clone()).with_timeout(ATTEMPT_TIMEOUT);

        let result = driver.block_on(loader.load(&spec)).expect("load settles");

        prop_assert!(result.success);
        prop_assert_eq!(
            result.source,
            LoadSource::Candidate {
                index: n - 1,
                url: urls[n - 1].clone()
            }
        );
        prop_assert_eq!(result.failures.len(), n - 1);
        prop_assert_eq!(host.inserted_urls(), urls);

        // Every failed element is removed before the next insert.
        let ops = host.ops();
        for (i, op) in ops.iter().enumerate() {
            if i > 0 && matches!(op, HostOp::Insert { .. }) {
                prop_assert!(
                    matches!(ops[i - 1], HostOp::Remove { .. }),
                    "insert #{} did not follow a removal",
                    i
                );
            }
        }
        prop_assert_eq!(host.live_elements(), 1);
    }
}

#[test]
fn every_candidate_failing_never_rejects() {
    let mut driver = LocalDriver::new();
    let host = Rc::new(MockAssetHost::new(driver.shared_timers()));
    let loader = ScriptLoader::new(host.clone(), driver.shared_timers());
    for url in ["https://a/x.js", "https://b/x.js", "https://c/x.js"] {
        host.set_outcome(url, Outcome::Hang);
    }
    let spec = AssetSpec::new("x", ["https://a/x.js", "https://b/x.js", "https://c/x.js"])
        .with_binding("X")
        .with_timeout(ATTEMPT_TIMEOUT);

    let waiter = driver.spawn(loader.settled("x"));
    let result = driver.block_on(loader.load(&spec)).expect("load settles");

    assert!(!result.success);
    assert_eq!(result.source, LoadSource::Stub);
    assert_eq!(driver.timers().now(), ATTEMPT_TIMEOUT * 3);
    assert_eq!(host.live_elements(), 0);
    assert_eq!(waiter.take(), Some(Some(result)));
}
