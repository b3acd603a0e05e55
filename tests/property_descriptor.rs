// tests/property_descriptor.rs

use std::collections::HashSet;

use jobdag::job::FlowAction;
use jobdag::submission::JobSpec;
use jobdag::types::{JobId, JobStatus};
use jobdag_test_utils::builders::{JobSpecBuilder, TaskSpecBuilder};
use proptest::prelude::*;

// Strategy for a valid DAG: task N may only depend on tasks 0..N, which
// rules out cycles by construction.
fn dag_spec_strategy(max_tasks: usize) -> impl Strategy<Value = JobSpec> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps_strat = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        );

        deps_strat.prop_map(move |raw_deps| {
            let mut builder = JobSpecBuilder::new("prop-job");
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let name = format!("task_{i}");
                let mut task = TaskSpecBuilder::new(&name);

                // Sanitize: only allow deps < i, deduplicated.
                let mut valid_deps = HashSet::new();
                for dep_idx in potential_deps {
                    if i > 0 {
                        valid_deps.insert(dep_idx % i);
                    }
                }
                let mut valid_deps: Vec<usize> = valid_deps.into_iter().collect();
                valid_deps.sort_unstable();
                for dep_idx in valid_deps {
                    task = task.depends_on(&format!("task_{dep_idx}"));
                }
                builder = builder.with_task(task.build());
            }
            builder.build()
        })
    })
}

proptest! {
    // Whatever the DAG shape and completion order: a task only ever enters
    // the frontier once every dependency has finished, nothing enters
    // twice, and the job always terminates.
    #[test]
    fn test_eligibility_invariant_holds_under_any_completion_order(
        spec in dag_spec_strategy(8),
        picks in proptest::collection::vec(any::<usize>(), 1..200),
    ) {
        let mut job = spec.instantiate(JobId(1)).unwrap();
        let total = job.total_tasks_count();

        let mut finished: HashSet<String> = HashSet::new();
        let mut ever_started: HashSet<String> = HashSet::new();
        let mut pick_stream = picks.into_iter().cycle();
        let mut steps = 0usize;

        while job.status() != JobStatus::Finished {
            steps += 1;
            prop_assert!(steps <= 2 * total + 2, "job did not terminate");

            let eligible = job.eligible_tasks();
            prop_assert!(!eligible.is_empty(), "non-finished job with an empty frontier");

            for task in &eligible {
                let name = task.id().readable_name().to_string();
                prop_assert!(!ever_started.contains(&name), "task {name} offered twice");
                let internal = job.task(task.id()).unwrap();
                for dep in internal.depends_on() {
                    prop_assert!(
                        finished.contains(dep.readable_name()),
                        "task {name} eligible before dependency {} finished",
                        dep.readable_name()
                    );
                }
            }

            let pick = pick_stream.next().unwrap_or_default() % eligible.len();
            let chosen = eligible[pick].id().clone();
            ever_started.insert(chosen.readable_name().to_string());
            job.start_task(&chosen, "host-1", steps as i64).unwrap();
            job.terminate_task(&chosen, &FlowAction::Continue, steps as i64 + 1)
                .unwrap();
            finished.insert(chosen.readable_name().to_string());
        }

        prop_assert_eq!(job.finished_tasks_count(), total);
        prop_assert_eq!(finished.len(), total);
    }
}
