//! Integration tests for the message loop
//!
//! These tests run real loopers on dedicated threads and cover:
//! - Due-time ordering and FIFO among equal times
//! - Quit semantics (front-of-queue, abandonment, closed queue)
//! - Idle handlers (one-shot, persistent, failing)
//! - Failure isolation in dispatch
//! - Message logging and slow-dispatch accounting

use parking_lot::Mutex;
use prometheus_looper::config::LooperConfig;
use prometheus_looper::core::{
    AppResult, Handler, IdleHandler, LoopError, LoopStats, Looper, Message, MessageTarget,
    PumpState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Prepare a looper on a fresh thread, let `setup` queue work, then run it.
fn run_looper<F>(config: LooperConfig, setup: F) -> LoopStats
where
    F: FnOnce(&Arc<Looper>) + Send + 'static,
{
    thread::spawn(move || {
        let looper = Looper::prepare_with(&config).unwrap();
        setup(&looper);
        let stats = looper.run().unwrap();
        assert_eq!(looper.state(), PumpState::Terminated);
        stats
    })
    .join()
    .unwrap()
}

/// Handler recording every `what` it sees; `what < 0` quits the loop.
fn recorder(looper: &Looper, seen: &Arc<Mutex<Vec<i32>>>) -> Handler {
    let seen = Arc::clone(seen);
    Handler::named(looper, "recorder", move |msg| {
        if msg.what < 0 {
            Looper::my_looper().unwrap().quit()?;
        } else {
            seen.lock().push(msg.what);
        }
        Ok(())
    })
}

fn log() -> Arc<Mutex<Vec<i32>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_earlier_due_time_dispatches_first() {
    let seen = log();
    let seen_in = Arc::clone(&seen);
    run_looper(LooperConfig::new("order"), move |looper| {
        let handler = recorder(looper, &seen_in);
        handler.send_message_delayed(handler.obtain_message(1), 60).unwrap();
        handler.send_message_delayed(handler.obtain_message(2), 30).unwrap();
        handler.send_message_delayed(handler.obtain_message(-1), 90).unwrap();
    });

    assert_eq!(*seen.lock(), vec![2, 1]);
}

#[test]
fn test_equal_due_times_keep_send_order() {
    let seen = log();
    let seen_in = Arc::clone(&seen);
    run_looper(LooperConfig::new("fifo"), move |looper| {
        let handler = recorder(looper, &seen_in);
        let at = looper.queue().now() + 5;
        for what in 0..10 {
            handler.send_message_at_time(handler.obtain_message(what), at).unwrap();
        }
        handler.send_message_at_time(handler.obtain_message(-1), at).unwrap();
    });

    assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_front_of_queue_messages_stay_fifo() {
    let seen = log();
    let seen_in = Arc::clone(&seen);
    run_looper(LooperConfig::new("front"), move |looper| {
        let handler = recorder(looper, &seen_in);
        handler.send_message_delayed(handler.obtain_message(10), 5).unwrap();
        handler.send_message_at_front_of_queue(handler.obtain_message(1)).unwrap();
        handler.send_message_at_front_of_queue(handler.obtain_message(2)).unwrap();
        handler.send_message_delayed(handler.obtain_message(-1), 5).unwrap();
    });

    assert_eq!(*seen.lock(), vec![1, 2, 10]);
}

// ============================================================================
// QUIT
// ============================================================================

#[test]
fn test_quit_preempts_delayed_work() {
    let seen = log();
    let seen_in = Arc::clone(&seen);
    let stats = run_looper(LooperConfig::new("preempt"), move |looper| {
        let handler = recorder(looper, &seen_in);
        handler.send_message_delayed(handler.obtain_message(1), 100).unwrap();
        assert!(looper.quit().unwrap());
        assert!(!handler.send_empty_message(2).unwrap());
    });

    assert!(seen.lock().is_empty());
    assert_eq!(stats.dispatched, 0);
}

#[test]
fn test_pending_time_zero_runs_before_quit() {
    let seen = log();
    let seen_in = Arc::clone(&seen);
    run_looper(LooperConfig::new("zero"), move |looper| {
        let handler = recorder(looper, &seen_in);
        handler.send_message_at_front_of_queue(handler.obtain_message(1)).unwrap();
        handler.send_message_delayed(handler.obtain_message(2), 50).unwrap();
        looper.quit().unwrap();
    });

    assert_eq!(*seen.lock(), vec![1]);
}

#[test]
fn test_quit_from_another_thread_wakes_parked_loop() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = thread::spawn(move || {
        let looper = Looper::prepare().unwrap();
        tx.send(Arc::clone(&looper)).unwrap();
        looper.run().unwrap()
    });

    let looper = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(looper.quit().unwrap());
    let stats = handle.join().unwrap();
    assert_eq!(stats.dispatched, 0);
    assert!(matches!(looper.run(), Err(LoopError::WrongThread { .. })));
}

// ============================================================================
// IDLE HANDLERS
// ============================================================================

#[test]
fn test_idle_handler_enqueues_work() {
    let seen = log();
    let idle_calls = Arc::new(AtomicUsize::new(0));
    let seen_in = Arc::clone(&seen);
    let calls = Arc::clone(&idle_calls);

    let stats = run_looper(LooperConfig::new("idle"), move |looper| {
        let handler = recorder(looper, &seen_in);
        looper.queue().add_idle_handler(Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            handler.send_empty_message(7).unwrap();
            handler.send_empty_message(-1).unwrap();
            false
        }));
    });

    assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), vec![7]);
    assert_eq!(stats.idle_invocations, 1);
}

#[test]
fn test_persistent_idle_handler_runs_on_every_idle_pass() {
    let persistent = Arc::new(AtomicUsize::new(0));
    let one_shot = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&persistent);
    let o = Arc::clone(&one_shot);

    let stats = run_looper(LooperConfig::new("idle-repeat"), move |looper| {
        let handler = Handler::new(looper, |_| Ok(()));
        let owner = Arc::clone(looper);
        looper.queue().add_idle_handler(Arc::new(move || {
            let n = p.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                handler.send_empty_message(n as i32).unwrap();
            } else {
                owner.quit().unwrap();
            }
            true
        }));
        looper.queue().add_idle_handler(Arc::new(move || {
            o.fetch_add(1, Ordering::SeqCst);
            false
        }));
    });

    assert_eq!(persistent.load(Ordering::SeqCst), 3);
    assert_eq!(one_shot.load(Ordering::SeqCst), 1);
    assert_eq!(stats.dispatched, 2);
}

#[test]
fn test_idle_handler_added_while_parked_runs_after_wake() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = thread::spawn(move || {
        let looper = Looper::prepare().unwrap();
        tx.send(Arc::clone(&looper)).unwrap();
        looper.run().unwrap()
    });

    let looper = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    looper.queue().add_idle_handler(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    }));
    looper.queue().wake();

    let deadline = Instant::now() + Duration::from_secs(5);
    while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // No message was fetched, so the persistent handler does not run again.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(looper.quit().unwrap());
    let stats = handle.join().unwrap();
    assert_eq!(stats.idle_invocations, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_idle_handler_signal_lets_other_thread_send_work() {
    let (handler_tx, handler_rx) = crossbeam_channel::bounded(1);
    let (idle_tx, idle_rx) = crossbeam_channel::bounded(1);
    let seen = log();
    let seen_in = Arc::clone(&seen);
    let idle_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&idle_calls);

    let handle = thread::spawn(move || {
        let looper = Looper::prepare().unwrap();
        let handler = recorder(&looper, &seen_in);
        looper.queue().add_idle_handler(Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = idle_tx.send(());
            false
        }));
        handler_tx.send(handler).unwrap();
        looper.run().unwrap()
    });

    let handler = handler_rx.recv().unwrap();
    idle_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(handler.send_empty_message(7).unwrap());
    assert!(handler.send_empty_message(-1).unwrap());

    let stats = handle.join().unwrap();
    assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), vec![7]);
    assert_eq!(stats.dispatched, 2);
}

struct FailingIdle;

impl IdleHandler for FailingIdle {
    fn queue_idle(&self) -> AppResult<bool> {
        anyhow::bail!("idle failure")
    }
}

#[test]
fn test_failing_idle_handlers_are_removed() {
    let stats = run_looper(LooperConfig::new("idle-fail"), |looper| {
        let queue = Arc::clone(looper.queue());
        looper.queue().add_idle_handler(Arc::new(FailingIdle));
        looper.queue().add_idle_handler(Arc::new(|| -> bool { panic!("idle panic") }));
        let handler = Handler::new(looper, move |_| {
            assert_eq!(queue.idle_handler_count(), 0);
            Looper::my_looper().unwrap().quit()?;
            Ok(())
        });
        handler.send_message_delayed(handler.obtain_message(1), 20).unwrap();
    });

    assert_eq!(stats.idle_invocations, 2);
    assert_eq!(stats.idle_failures, 2);
    assert_eq!(stats.dispatch_failures, 0);
}

// ============================================================================
// DISPATCH
// ============================================================================

#[test]
fn test_dispatch_failures_do_not_stop_the_loop() {
    let stats = run_looper(LooperConfig::new("failures"), |looper| {
        let handler = Handler::new(looper, |msg| match msg.what {
            1 => anyhow::bail!("handler error"),
            2 => panic!("handler panic"),
            _ => {
                Looper::my_looper().unwrap().quit()?;
                Ok(())
            }
        });
        for what in 1..=3 {
            handler.send_empty_message(what).unwrap();
        }
    });

    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.dispatch_failures, 2);
}

#[test]
fn test_nested_run_is_rejected() {
    let nested = Arc::new(Mutex::new(None));
    let nested_in = Arc::clone(&nested);
    run_looper(LooperConfig::new("nested"), move |looper| {
        let handler = Handler::callbacks_only(looper);
        handler
            .post(move || {
                let looper = Looper::my_looper().unwrap();
                *nested_in.lock() = Some(matches!(looper.run(), Err(LoopError::AlreadyRunning)));
                looper.quit()?;
                Ok(())
            })
            .unwrap();
    });

    assert_eq!(*nested.lock(), Some(true));
}

#[test]
fn test_many_producers_single_consumer() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 100;

    let (tx, rx) = crossbeam_channel::bounded(1);
    let count = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&count);
    let consumer = thread::spawn(move || {
        let looper = Looper::prepare().unwrap();
        let handler = Handler::new(&looper, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tx.send(handler).unwrap();
        looper.run().unwrap()
    });

    let handler = rx.recv().unwrap();
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let handler = handler.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    assert!(handler.send_empty_message((p * PER_PRODUCER + i) as i32).unwrap());
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    handler
        .post(|| {
            Looper::my_looper().unwrap().quit()?;
            Ok(())
        })
        .unwrap();
    let stats = consumer.join().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
    assert_eq!(stats.dispatched as usize, PRODUCERS * PER_PRODUCER + 1);
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[test]
fn test_message_logging_lines() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    run_looper(LooperConfig::new("logged"), move |looper| {
        looper.set_message_logging(Some(Arc::new(move |line: &str| {
            sink.lock().push(line.to_string());
        })));
        let handler = Handler::named(looper, "printer", |_| {
            Looper::my_looper().unwrap().quit()?;
            Ok(())
        });
        handler.send_empty_message(4).unwrap();
    });

    let lines = lines.lock();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], ">>>>> Dispatching to printer message: 4");
    assert!(lines[1].starts_with("<<<<< Finished to printer"));
}

/// Target whose label cannot be produced.
struct UnlabelledTarget;

impl MessageTarget for UnlabelledTarget {
    fn dispatch(&self, message: &Message) -> AppResult<()> {
        if message.what < 0 {
            Looper::my_looper().unwrap().quit()?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        panic!("describe panic")
    }
}

fn broken_print(line: &str) {
    panic!("printer panic on {line}")
}

#[test]
fn test_panicking_printer_and_describe_do_not_stop_the_loop() {
    let printed = Arc::new(AtomicUsize::new(0));
    let printed_in = Arc::clone(&printed);
    let stats = run_looper(LooperConfig::new("fragile-logging"), move |looper| {
        looper.set_message_logging(Some(Arc::new(move |line: &str| {
            printed_in.fetch_add(1, Ordering::SeqCst);
            broken_print(line);
        })));
        let handler = Handler::from_parts(Arc::clone(looper.queue()), Arc::new(UnlabelledTarget));
        handler.send_empty_message(1).unwrap();
        handler.send_empty_message(-1).unwrap();
    });

    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.dispatch_failures, 0);
    assert_eq!(printed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_slow_dispatch_is_counted() {
    let config = LooperConfig::new("slow").with_slow_dispatch_threshold_ms(5);
    let stats = run_looper(config, |looper| {
        let handler = Handler::new(looper, |msg| {
            if msg.what == 1 {
                thread::sleep(Duration::from_millis(30));
            } else {
                Looper::my_looper().unwrap().quit()?;
            }
            Ok(())
        });
        handler.send_empty_message(1).unwrap();
        handler.send_empty_message(2).unwrap();
    });

    assert_eq!(stats.slow_dispatches, 1);
    assert_eq!(stats.dispatched, 2);
}

#[test]
fn test_dump_reports_pending_messages() {
    thread::spawn(|| {
        let looper = Looper::prepare_with(&LooperConfig::new("dump")).unwrap();
        let handler = Handler::named(&looper, "dumper", |_| Ok(()));
        handler.send_message_delayed(handler.obtain_message(9), 1_000).unwrap();
        handler.post_delayed(|| Ok(()), 2_000).unwrap();

        let snapshot = looper.dump();
        assert_eq!(snapshot.state, PumpState::Prepared);
        assert_eq!(snapshot.pending.len(), 2);
        assert_eq!(snapshot.pending[0].what, 9);
        assert_eq!(snapshot.pending[0].target, "dumper");
        assert!(snapshot.pending[1].has_callback);
        assert!(snapshot.pending[0].when < snapshot.pending[1].when);
    })
    .join()
    .unwrap();
}
