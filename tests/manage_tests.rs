use futures_foreman::manage_tasks;

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_foreman=trace"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[tokio::test]
async fn single_worker_observes_submission_order() {
  setup_tracing_for_test();
  let mut observed = Vec::new();

  manage_tasks(
    1,
    |name: &'static str| async move { Ok::<_, String>(name) },
    |input, _result| {
      observed.push(input);
      ControlFlow::Continue(Vec::new())
    },
    vec!["a", "b"],
  )
  .await;

  assert_eq!(observed, vec!["a", "b"]);
}

#[tokio::test]
async fn manager_added_work_is_dispatched_fifo() {
  setup_tracing_for_test();
  let mut observed = Vec::new();

  manage_tasks(
    1,
    |n: u32| async move { Ok::<_, String>(n) },
    |input, _result| {
      observed.push(input);
      let follow_up = match input {
        1 => vec![2, 3],
        2 => vec![4],
        _ => Vec::new(),
      };
      ControlFlow::Continue(follow_up)
    },
    vec![1],
  )
  .await;

  assert_eq!(observed, vec![1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduler_never_exceeds_worker_bound() {
  setup_tracing_for_test();
  let current = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let mut resolved = 0;

  let task = {
    let current = current.clone();
    let peak = peak.clone();
    move |_n: u32| {
      let current = current.clone();
      let peak = peak.clone();
      async move {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(10)).await;
        current.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, String>(())
      }
    }
  };

  manage_tasks(
    3,
    task,
    |_input, _result| {
      resolved += 1;
      ControlFlow::Continue(Vec::new())
    },
    (0..20u32).collect(),
  )
  .await;

  assert_eq!(resolved, 20);
  let peak = peak.load(Ordering::SeqCst);
  assert!(peak <= 3, "peak dispatch {} exceeded worker bound 3", peak);
}

#[tokio::test]
async fn manager_halt_stops_scheduling() {
  setup_tracing_for_test();
  let executed = Arc::new(AtomicUsize::new(0));
  let mut manager_calls = 0;

  let task = {
    let executed = executed.clone();
    move |n: u32| {
      let executed = executed.clone();
      async move {
        executed.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(n)
      }
    }
  };

  manage_tasks(
    2,
    task,
    |_input, _result| {
      manager_calls += 1;
      ControlFlow::Break(())
    },
    (0..10u32).collect(),
  )
  .await;

  assert_eq!(manager_calls, 1, "manager halted on the first result");
  // Anything already handed to the pool still resolves during the drain, but
  // nothing beyond the worker bound was ever dispatched.
  let executed = executed.load(Ordering::SeqCst);
  assert!(executed <= 2, "{} tasks ran after a first-result halt", executed);
}

#[tokio::test]
async fn task_errors_do_not_halt_scheduling() {
  setup_tracing_for_test();
  let mut failures = 0;

  manage_tasks(
    2,
    |n: u32| async move { Err::<(), String>(format!("failed on {}", n)) },
    |_input, result| {
      assert!(result.is_err());
      failures += 1;
      ControlFlow::Continue(Vec::new())
    },
    (0..5u32).collect(),
  )
  .await;

  assert_eq!(failures, 5, "every error reached the manager");
}

#[tokio::test]
async fn fault_halts_scheduling_and_reraises() {
  setup_tracing_for_test();

  let task = |n: u32| async move {
    if n == 0 {
      panic!("scheduler fault probe");
    }
    Ok::<_, String>(n)
  };

  let run = AssertUnwindSafe(manage_tasks(
    2,
    task,
    |_input, _result: Result<u32, String>| ControlFlow::Continue(Vec::new()),
    vec![0, 1, 2, 3],
  ))
  .catch_unwind();

  let payload = run.await.expect_err("the fault must re-raise in the orchestrating flow");
  assert_eq!(payload.downcast_ref::<&str>().copied(), Some("scheduler fault probe"));
}

fn links_of(page: &'static str) -> Vec<&'static str> {
  match page {
    "/" => vec!["a"],
    "a" => vec!["b1", "b2"],
    "b1" => vec!["c"],
    "b2" => vec!["c"],
    "c" => vec!["/"],
    other => panic!("unknown page {}", other),
  }
}

// End-to-end: crawl a fixed 5-node link graph with a manager that records the
// adjacency map, enqueues unseen pages, and retries failed fetches up to 3
// times before giving up on that branch. The outcome must be identical for
// one worker, two workers, and available parallelism.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawl_visits_every_node_exactly_once_for_all_widths() {
  setup_tracing_for_test();

  for workers in [1usize, 2, 0] {
    let attempts: Arc<Mutex<HashMap<&'static str, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let task = {
      let attempts = attempts.clone();
      move |page: &'static str| {
        let attempts = attempts.clone();
        async move {
          let tries = {
            let mut attempts = attempts.lock().unwrap();
            let tries = attempts.entry(page).or_insert(0);
            *tries += 1;
            *tries
          };
          // One transient failure to exercise the manager's retry path.
          if page == "b2" && tries == 1 {
            return Err(format!("transient fetch failure on {}", page));
          }
          Ok(links_of(page))
        }
      }
    };

    let mut adjacency: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut retries: HashMap<&'static str, usize> = HashMap::new();
    seen.insert("/");

    manage_tasks(
      workers,
      task,
      |page, result: Result<Vec<&'static str>, String>| match result {
        Ok(links) => {
          let mut fresh = Vec::new();
          for link in &links {
            if seen.insert(*link) {
              fresh.push(*link);
            }
          }
          adjacency.insert(page, links);
          ControlFlow::Continue(fresh)
        }
        Err(_) => {
          let tries = retries.entry(page).or_insert(0);
          *tries += 1;
          if *tries < 3 {
            ControlFlow::Continue(vec![page])
          } else {
            ControlFlow::Continue(Vec::new())
          }
        }
      },
      vec!["/"],
    )
    .await;

    assert_eq!(adjacency.len(), 5, "workers={}", workers);
    assert_eq!(adjacency["/"], vec!["a"]);
    assert_eq!(adjacency["a"], vec!["b1", "b2"]);
    assert_eq!(adjacency["b1"], vec!["c"]);
    assert_eq!(adjacency["b2"], vec!["c"]);
    assert_eq!(adjacency["c"], vec!["/"]);

    let attempts = attempts.lock().unwrap();
    assert_eq!(attempts["b2"], 2, "b2 was retried once (workers={})", workers);
    for page in ["/", "a", "b1", "c"] {
      assert_eq!(attempts[page], 1, "{} fetched exactly once (workers={})", page, workers);
    }
  }
}
