#![allow(dead_code)]

use std::collections::HashMap;
use std::rc::Rc;

use promise_js::{
  Engine, EngineOptions, HostHooks, Intrinsics, ObjectHandle, PromiseHandle,
  PromiseRejectionOperation, PropertyKey, Tracer, Value, VmError,
};

pub type NativeFn = Rc<dyn Fn(&mut FakeHost, &mut Engine, Value, &[Value]) -> Result<Value, VmError>>;

#[derive(Clone)]
pub enum Property {
  Data(Value),
  Getter(NativeFn),
}

#[derive(Default, Clone)]
struct HostObject {
  call: Option<NativeFn>,
  construct: Option<NativeFn>,
  props: HashMap<PropertyKey, Property>,
  error: Option<&'static str>,
  holds: Vec<Value>,
}

/// A deterministic embedding: host objects are plain property maps, functions are Rust closures.
pub struct FakeHost {
  objects: Vec<HostObject>,
  intrinsics: Intrinsics,
  promise_props: HashMap<(PromiseHandle, PropertyKey), Property>,
  pub log: Vec<String>,
  pub tracker: Vec<(PromiseHandle, PromiseRejectionOperation)>,
  pub then_watchpoint: bool,
  pub species_watchpoint: bool,
}

impl FakeHost {
  pub fn new(engine: &Engine) -> Self {
    Self {
      objects: Vec::new(),
      intrinsics: engine.intrinsics(),
      promise_props: HashMap::new(),
      log: Vec::new(),
      tracker: Vec::new(),
      then_watchpoint: false,
      species_watchpoint: false,
    }
  }

  /// Sets both fast-path guards.
  pub fn set_watchpoints(&mut self, valid: bool) {
    self.then_watchpoint = valid;
    self.species_watchpoint = valid;
  }

  fn alloc(&mut self, object: HostObject) -> Value {
    let handle = ObjectHandle::from_raw(self.objects.len() as u64);
    self.objects.push(object);
    Value::Object(handle)
  }

  fn object_mut(&mut self, value: Value) -> &mut HostObject {
    let Value::Object(handle) = value else {
      panic!("not a host object: {value:?}");
    };
    &mut self.objects[handle.to_raw() as usize]
  }

  fn object(&self, handle: ObjectHandle) -> &HostObject {
    &self.objects[handle.to_raw() as usize]
  }

  pub fn object_value(&mut self) -> Value {
    self.alloc(HostObject::default())
  }

  pub fn function(
    &mut self,
    f: impl Fn(&mut FakeHost, &mut Engine, Value, &[Value]) -> Result<Value, VmError> + 'static,
  ) -> Value {
    self.alloc(HostObject {
      call: Some(Rc::new(f)),
      ..HostObject::default()
    })
  }

  pub fn constructor(
    &mut self,
    f: impl Fn(&mut FakeHost, &mut Engine, Value, &[Value]) -> Result<Value, VmError> + 'static,
  ) -> Value {
    self.alloc(HostObject {
      construct: Some(Rc::new(f)),
      ..HostObject::default()
    })
  }

  pub fn set(&mut self, object: Value, key: PropertyKey, value: Value) {
    self.object_mut(object).props.insert(key, Property::Data(value));
  }

  pub fn set_getter(
    &mut self,
    object: Value,
    key: PropertyKey,
    getter: impl Fn(&mut FakeHost, &mut Engine, Value, &[Value]) -> Result<Value, VmError> + 'static,
  ) {
    self
      .object_mut(object)
      .props
      .insert(key, Property::Getter(Rc::new(getter)));
  }

  /// Shadows a property of an engine promise.
  pub fn set_promise_property(&mut self, promise: PromiseHandle, key: PropertyKey, value: Value) {
    self
      .promise_props
      .insert((promise, key), Property::Data(value));
  }

  pub fn set_promise_getter(
    &mut self,
    promise: PromiseHandle,
    key: PropertyKey,
    getter: impl Fn(&mut FakeHost, &mut Engine, Value, &[Value]) -> Result<Value, VmError> + 'static,
  ) {
    self
      .promise_props
      .insert((promise, key), Property::Getter(Rc::new(getter)));
  }

  /// Makes `object` keep `value` alive across collections.
  pub fn hold(&mut self, object: Value, value: Value) {
    self.object_mut(object).holds.push(value);
  }

  /// A function that logs `label:arg0,arg1,...` and returns `undefined`.
  pub fn recorder(&mut self, label: &'static str) -> Value {
    self.function(move |host, _engine, _this, args| {
      let args: Vec<String> = args.iter().map(|arg| host.describe(*arg)).collect();
      host.log.push(format!("{label}:{}", args.join(",")));
      Ok(Value::Undefined)
    })
  }

  /// A function that always throws `value`.
  pub fn thrower(&mut self, value: Value) -> Value {
    self.function(move |_host, _engine, _this, _args| Err(VmError::Throw(value)))
  }

  /// `{ then(resolve, reject) { resolve(value) } }`.
  pub fn thenable_resolving_with(&mut self, value: Value) -> Value {
    let then = self.function(move |host, engine, _this, args| {
      host.log.push("then".to_string());
      let resolve = args.first().copied().unwrap_or(Value::Undefined);
      engine.call(host, resolve, Value::Undefined, &[value])
    });
    let thenable = self.object_value();
    self.set(thenable, PropertyKey::Then, then);
    thenable
  }

  pub fn error_message(&self, value: Value) -> Option<&'static str> {
    match value {
      Value::Object(handle) => self.object(handle).error,
      _ => None,
    }
  }

  pub fn describe(&self, value: Value) -> String {
    match value {
      Value::Undefined => "undefined".to_string(),
      Value::Null => "null".to_string(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => n.to_string(),
      Value::Object(handle) => match self.object(handle).error {
        Some(message) => format!("TypeError({message})"),
        None => format!("object#{}", handle.to_raw()),
      },
      Value::Promise(_) => "promise".to_string(),
      Value::Function(_) => "function".to_string(),
    }
  }

  fn read(&mut self, engine: &mut Engine, target: Value, property: Option<Property>) -> Result<Value, VmError> {
    match property {
      None => Ok(Value::Undefined),
      Some(Property::Data(value)) => Ok(value),
      Some(Property::Getter(getter)) => getter(self, engine, target, &[]),
    }
  }
}

impl HostHooks for FakeHost {
  fn call(
    &mut self,
    engine: &mut Engine,
    callee: ObjectHandle,
    this: Value,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    let Some(call) = self.object(callee).call.clone() else {
      return Err(VmError::NotCallable);
    };
    call(self, engine, this, arguments)
  }

  fn construct(
    &mut self,
    engine: &mut Engine,
    constructor: ObjectHandle,
    arguments: &[Value],
  ) -> Result<Value, VmError> {
    let Some(construct) = self.object(constructor).construct.clone() else {
      return Err(VmError::NotConstructable);
    };
    construct(self, engine, Value::Undefined, arguments)
  }

  fn is_callable(&self, object: ObjectHandle) -> bool {
    self.object(object).call.is_some()
  }

  fn is_constructor(&self, object: ObjectHandle) -> bool {
    self.object(object).construct.is_some()
  }

  fn get(&mut self, engine: &mut Engine, target: Value, key: PropertyKey) -> Result<Value, VmError> {
    match target {
      Value::Object(handle) => {
        let property = self.object(handle).props.get(&key).cloned();
        self.read(engine, target, property)
      }
      Value::Promise(promise) => {
        if let Some(property) = self.promise_props.get(&(promise, key)).cloned() {
          return self.read(engine, target, Some(property));
        }
        Ok(match key {
          PropertyKey::Then => self.intrinsics.promise_prototype_then(),
          PropertyKey::Constructor => {
            let flavor = engine.promise_flavor(promise)?;
            self.intrinsics.promise_constructor(flavor)
          }
          PropertyKey::Species => Value::Undefined,
        })
      }
      Value::Function(_) => Ok(match key {
        PropertyKey::Species
          if target == self.intrinsics.promise() || target == self.intrinsics.internal_promise() =>
        {
          target
        }
        _ => Value::Undefined,
      }),
      _ => Ok(Value::Undefined),
    }
  }

  fn create_type_error(&mut self, message: &'static str) -> Value {
    self.alloc(HostObject {
      error: Some(message),
      ..HostObject::default()
    })
  }

  fn promise_then_watchpoint_is_valid(&self, _promise: PromiseHandle) -> bool {
    self.then_watchpoint
  }

  fn promise_species_watchpoint_is_valid(&self, _promise: PromiseHandle) -> bool {
    self.species_watchpoint
  }

  fn promise_rejection_tracker(
    &mut self,
    promise: PromiseHandle,
    operation: PromiseRejectionOperation,
  ) -> Result<(), VmError> {
    self.tracker.push((promise, operation));
    Ok(())
  }

  fn trace_object(&self, object: ObjectHandle, tracer: &mut Tracer) {
    let object = self.object(object);
    for value in &object.holds {
      tracer.trace_value(*value);
    }
    for property in object.props.values() {
      if let Property::Data(value) = property {
        tracer.trace_value(*value);
      }
    }
  }
}

pub fn setup() -> (Engine, FakeHost) {
  setup_with(EngineOptions::default())
}

pub fn setup_with(options: EngineOptions) -> (Engine, FakeHost) {
  let engine = Engine::new(options);
  let host = FakeHost::new(&engine);
  (engine, host)
}

/// Attaches `on_fulfilled`/`on_rejected` to `promise` with no derived promise.
pub fn observe(
  engine: &mut Engine,
  host: &mut FakeHost,
  promise: PromiseHandle,
  on_fulfilled: Value,
  on_rejected: Value,
) {
  engine
    .perform_promise_then(
      host,
      promise,
      on_fulfilled,
      on_rejected,
      promise_js::ReactionTarget::None,
      Value::Undefined,
    )
    .unwrap();
}

/// Runs a checkpoint and asserts it produced no errors.
pub fn drain(engine: &mut Engine, host: &mut FakeHost) {
  let errors = engine.perform_microtask_checkpoint(host);
  assert!(errors.is_empty(), "unexpected microtask errors: {errors:?}");
}
