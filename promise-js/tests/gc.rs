mod common;

use common::{drain, observe, setup};
use promise_js::{PromiseFlavor, PromiseStatus, Value, VmError};

#[test]
fn unrooted_promise_is_freed_and_its_handle_goes_stale() {
  let (mut engine, host) = setup();
  let p = engine.new_promise(PromiseFlavor::Public);
  assert_eq!(engine.live_promise_count(), 1);

  let freed = engine.collect_garbage(&host, &[]);
  assert_eq!(freed, 1);
  assert_eq!(engine.live_promise_count(), 0);
  assert!(!engine.is_valid_promise(p));
  assert!(matches!(engine.promise_status(p), Err(VmError::InvalidHandle)));

  // The slot is reused under a new generation.
  let q = engine.new_promise(PromiseFlavor::Public);
  assert_eq!(q.id().index(), p.id().index());
  assert_ne!(q, p);
  assert!(matches!(engine.promise_result(p), Err(VmError::InvalidHandle)));
  assert_eq!(engine.promise_status(q).unwrap(), PromiseStatus::Pending);
}

#[test]
fn rooted_promise_keeps_its_reactions_alive() {
  let (mut engine, mut host) = setup();
  host.set_watchpoints(true);
  let p = engine.new_promise(PromiseFlavor::Public);
  let Value::Promise(derived) = engine
    .then(&mut host, p, Value::Undefined, Value::Undefined)
    .unwrap()
  else {
    panic!("expected an engine promise");
  };

  engine.collect_garbage(&host, &[Value::Promise(p)]);
  assert!(engine.is_valid_promise(p));
  assert!(engine.is_valid_promise(derived));

  engine.resolve(&mut host, p, Value::Number(1.0)).unwrap();
  drain(&mut engine, &mut host);
  assert_eq!(engine.promise_result(derived).unwrap(), Some(Value::Number(1.0)));
}

#[test]
fn settled_promise_keeps_its_result_alive() {
  let (mut engine, host) = setup();
  let inner = engine.new_promise(PromiseFlavor::Public);
  let outer = engine.new_promise(PromiseFlavor::Public);
  engine.fulfill(outer, Value::Promise(inner)).unwrap();

  engine.collect_garbage(&host, &[Value::Promise(outer)]);
  assert!(engine.is_valid_promise(inner));

  engine.collect_garbage(&host, &[]);
  assert_eq!(engine.live_promise_count(), 0);
}

#[test]
fn queued_jobs_keep_their_promises_alive() {
  let (mut engine, mut host) = setup();
  host.set_watchpoints(true);
  let inner = engine.new_promise(PromiseFlavor::Public);
  let outer = engine.new_promise(PromiseFlavor::Public);
  engine.resolve(&mut host, outer, Value::Promise(inner)).unwrap();

  engine.collect_garbage(&host, &[]);
  assert!(engine.is_valid_promise(inner));
  assert!(engine.is_valid_promise(outer));

  engine.resolve(&mut host, inner, Value::Number(2.0)).unwrap();
  drain(&mut engine, &mut host);
  assert_eq!(engine.promise_result(outer).unwrap(), Some(Value::Number(2.0)));

  engine.collect_garbage(&host, &[]);
  assert_eq!(engine.live_promise_count(), 0);
}

#[test]
fn host_objects_keep_engine_values_alive() {
  let (mut engine, mut host) = setup();
  let p = engine.new_promise(PromiseFlavor::Public);
  let holder = host.object_value();
  host.hold(holder, Value::Promise(p));

  engine.collect_garbage(&host, &[holder]);
  assert!(engine.is_valid_promise(p));

  engine.collect_garbage(&host, &[]);
  assert!(!engine.is_valid_promise(p));
}

#[test]
fn resolving_functions_keep_their_promise_alive() {
  let (mut engine, mut host) = setup();
  let p = engine.new_promise(PromiseFlavor::Public);
  let (resolve, reject) = engine.create_resolving_functions(p);

  engine.collect_garbage(&host, &[reject]);
  assert!(engine.is_valid_promise(p));

  engine
    .call(&mut host, resolve, Value::Undefined, &[Value::Number(3.0)])
    .unwrap();
  assert_eq!(engine.promise_result(p).unwrap(), Some(Value::Number(3.0)));

  // Both halves and the promise are now unreachable.
  assert_eq!(engine.collect_garbage(&host, &[]), 3);
}

#[test]
fn intrinsics_survive_collection() {
  let (mut engine, mut host) = setup();
  host.set_watchpoints(true);
  let intrinsics = engine.intrinsics();

  engine.collect_garbage(&host, &[]);
  assert!(engine.is_callable(&host, intrinsics.promise_prototype_then()));
  assert!(engine.is_constructor(&host, intrinsics.promise()));
  assert!(engine.is_constructor(&host, intrinsics.internal_promise()));

  let p = engine.new_promise(PromiseFlavor::Public);
  let handler = host.recorder("ok");
  engine
    .call(&mut host, intrinsics.promise_prototype_then(), Value::Promise(p), &[handler])
    .unwrap();
  engine.resolve(&mut host, p, Value::Number(1.0)).unwrap();
  drain(&mut engine, &mut host);
  assert_eq!(host.log, vec!["ok:1"]);
}

#[test]
fn reactions_registered_without_a_target_are_traced() {
  let (mut engine, mut host) = setup();
  let p = engine.new_promise(PromiseFlavor::Public);
  let watched = engine.new_promise(PromiseFlavor::Public);
  let holder = host.function(|_host, _engine, _this, _args| Ok(Value::Undefined));
  host.hold(holder, Value::Promise(watched));
  observe(&mut engine, &mut host, p, holder, Value::Undefined);

  engine.collect_garbage(&host, &[Value::Promise(p)]);
  assert!(engine.is_valid_promise(watched));
}

#[test]
fn collection_inside_a_handler_keeps_the_running_job_alive() {
  let (mut engine, mut host) = setup();
  host.set_watchpoints(true);
  let p = engine.new_promise(PromiseFlavor::Public);
  let collect = host.function(|host, engine, _this, _args| {
    host.log.push("h".to_string());
    engine.collect_garbage(&*host, &[]);
    Ok(Value::Number(7.0))
  });
  let Value::Promise(derived) = engine
    .then(&mut host, p, collect, Value::Undefined)
    .unwrap()
  else {
    panic!("expected an engine promise");
  };
  let after = host.recorder("k");
  engine.then(&mut host, derived, after, Value::Undefined).unwrap();

  engine.resolve(&mut host, p, Value::Number(1.0)).unwrap();
  // Nothing is rooted once the job leaves the queue; only the running job holds `derived`.
  drain(&mut engine, &mut host);
  assert_eq!(host.log, vec!["h", "k:7"]);
}
