mod common;

use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;

use common::setup;
use promise_js::{PromiseFlavor, Value};

#[derive(Clone, Default)]
struct SharedWriter {
  buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
  fn into_inner(self) -> Vec<u8> {
    match Arc::try_unwrap(self.buffer) {
      Ok(buffer) => buffer.into_inner().unwrap(),
      Err(arc) => arc.lock().unwrap().clone(),
    }
  }
}

struct SharedWriterGuard<'a> {
  buffer: &'a Arc<Mutex<Vec<u8>>>,
}

impl<'a> io::Write for SharedWriterGuard<'a> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.buffer.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> MakeWriter<'a> for SharedWriter {
  type Writer = SharedWriterGuard<'a>;

  fn make_writer(&'a self) -> Self::Writer {
    SharedWriterGuard {
      buffer: &self.buffer,
    }
  }
}

fn capture(f: impl FnOnce()) -> String {
  let writer = SharedWriter::default();
  let subscriber = tracing_subscriber::fmt()
    .with_span_events(FmtSpan::CLOSE)
    .with_max_level(tracing::Level::DEBUG)
    .with_ansi(false)
    .with_writer(writer.clone())
    .finish();
  let guard = tracing::subscriber::set_default(subscriber);
  f();
  drop(guard);
  String::from_utf8(writer.into_inner()).unwrap()
}

#[test]
fn checkpoint_emits_a_span_with_job_counts() {
  let output = capture(|| {
    let (mut engine, mut host) = setup();
    for label in ["a", "b"] {
      let job = host.recorder(label);
      engine.enqueue_function_job(job).unwrap();
    }
    assert!(engine.perform_microtask_checkpoint(&mut host).is_empty());
  });

  assert!(
    output.contains("microtask_checkpoint"),
    "expected checkpoint span output, got: {output}"
  );
  assert!(
    output.contains("jobs=2"),
    "expected jobs field to be recorded, got: {output}"
  );
}

#[test]
fn rejection_tracking_and_termination_are_logged() {
  let output = capture(|| {
    let (mut engine, mut host) = setup();
    engine.set_fuel(Some(0));
    let p = engine.new_promise(PromiseFlavor::Public);
    engine.reject(&mut host, p, Value::Number(1.0)).unwrap();
    let job = host.recorder("job");
    engine.enqueue_function_job(job).unwrap();
    assert_eq!(engine.perform_microtask_checkpoint(&mut host).len(), 1);
  });

  assert!(
    output.contains("promise rejection tracker"),
    "expected tracker event, got: {output}"
  );
  assert!(
    output.contains("microtask checkpoint stopped"),
    "expected termination event, got: {output}"
  );
}
