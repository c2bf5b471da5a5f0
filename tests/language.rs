//! End-to-end tests for the core emission language: control flow, variables,
//! assertions, casts, host callbacks and the fault path. Each test builds a
//! small program, runs it under the JIT, and observes behavior through host
//! hooks or the returned fault.

use std::cell::RefCell;
use std::rc::Rc;

use bumpalo::Bump;
use inkwell::context::Context;
use stria::{BuildOptions, EmitError, Emitter, Fault, FaultKind, HostValue, ToValue, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Register a hook that appends its arguments to the shared sink.
fn record<'ctx>(
    fx: &Emitter<'ctx, '_>,
    sink: &Rc<RefCell<Vec<HostValue>>>,
    arguments: &[Value<'ctx>],
) {
    let sink = sink.clone();
    fx.hook(arguments, move |values| {
        sink.borrow_mut().extend_from_slice(values);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_if_runs_taken_branch_only() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    fx.if_(true, |fx| {
        record(fx, &seen, &[1i64.to_value(fx)?]);
        Ok(())
    })
    .unwrap();
    fx.if_(false, |fx| {
        record(fx, &seen, &[2i64.to_value(fx)?]);
        Ok(())
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[HostValue::Int(1)]);
}

#[test]
fn test_if_else_takes_one_arm() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let three = 3i64.to_value(&fx).unwrap();
    let condition = three.gt(&fx, 0i64).unwrap();
    fx.if_else(condition, |fx, is_then| {
        let marker = if is_then { 1i64 } else { 0i64 };
        record(fx, &seen, &[marker.to_value(fx)?]);
        Ok(())
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[HostValue::Int(1)]);
}

#[test]
fn test_if_else_with_both_arms_returning() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let i64_ty = context.i64_type().into();
    let sign = fx
        .define_function("sign", &[i64_ty], Some(i64_ty), |fx, arguments| {
            let positive = arguments[0].gt(fx, 0i64)?;
            fx.if_else(positive, |fx, is_then| {
                let result = if is_then { 1i64 } else { -1i64 };
                fx.return_(Some(result.to_value(fx)?))
            })
        })
        .unwrap();

    let of_five = fx.call(&sign, &[5i64.to_value(&fx).unwrap()]).unwrap().unwrap();
    let of_minus = fx.call(&sign, &[(-5i64).to_value(&fx).unwrap()]).unwrap().unwrap();
    record(&fx, &seen, &[of_five, of_minus]);

    fx.finish().unwrap().run().unwrap();
    assert_eq!(
        seen.borrow().as_slice(),
        &[HostValue::Int(1), HostValue::Int(-1)]
    );
}

#[test]
fn test_for_visits_indices_in_order() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    fx.for_(5i64, |fx, index| {
        record(fx, &seen, &[index]);
        Ok(())
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    let expected: Vec<HostValue> = (0..5).map(HostValue::Int).collect();
    assert_eq!(seen.borrow().as_slice(), expected.as_slice());
}

#[test]
fn test_nested_loops_multiply_out() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    fx.for_(3i64, |fx, row| {
        fx.for_(4i64, |fx, column| {
            let flat = row.mul(fx, 4i64)?.add(fx, column)?;
            record(fx, &seen, &[flat]);
            Ok(())
        })
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    let expected: Vec<HostValue> = (0..12).map(HostValue::Int).collect();
    assert_eq!(seen.borrow().as_slice(), expected.as_slice());
}

#[test]
fn test_break_leaves_innermost_loop() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    fx.for_(10i64, |fx, index| {
        let done = index.eq(fx, 3i64)?;
        fx.if_(done, |fx| fx.break_())?;
        record(fx, &seen, &[index]);
        Ok(())
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    let expected: Vec<HostValue> = (0..3).map(HostValue::Int).collect();
    assert_eq!(seen.borrow().as_slice(), expected.as_slice());
}

#[test]
fn test_break_outside_loop_is_rejected() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    assert!(matches!(fx.break_(), Err(EmitError::BreakOutsideLoop)));
}

#[test]
fn test_assert_formats_message_and_keeps_trace() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let seven = 7i64.to_value(&fx).unwrap();
    let failing = seven.eq(&fx, 8i64).unwrap();
    fx.assert_(failing, "value is {}, expected 8", &[seven]).unwrap();

    let fault = fx.finish().unwrap().run().unwrap_err();
    assert_eq!(fault.kind, FaultKind::Assertion);
    assert_eq!(fault.message, "value is 7, expected 8");
    assert!(fault.emission_trace.is_some());
}

#[test]
fn test_passing_assert_is_silent() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let seven = 7i64.to_value(&fx).unwrap();
    let holds = seven.eq(&fx, 7i64).unwrap();
    fx.assert_(holds, "never shown", &[]).unwrap();

    fx.finish().unwrap().run().unwrap();
}

#[test]
fn test_host_fault_aborts_and_short_circuits() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let after = Rc::new(RefCell::new(Vec::new()));

    fx.hook(&[], |_| Err(Fault::raised("host said no"))).unwrap();
    record(&fx, &after, &[]);

    let fault = fx.finish().unwrap().run().unwrap_err();
    assert_eq!(fault.kind, FaultKind::HostCall);
    assert_eq!(fault.message, "host said no");
    assert!(after.borrow().is_empty());
}

#[test]
fn test_variable_counts_loop_iterations() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let total = stria::Variable::set_to(&fx, 0i64).unwrap();
    fx.for_(8i64, |fx, _index| total.add_assign(fx, 1i64)).unwrap();

    let count = total.get(&fx).unwrap();
    let exact = count.eq(&fx, 8i64).unwrap();
    fx.assert_(exact, "counted {} iterations", &[count]).unwrap();

    fx.finish().unwrap().run().unwrap();
}

#[test]
fn test_variable_miscount_faults_with_value() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let total = stria::Variable::set_to(&fx, 0i64).unwrap();
    fx.for_(8i64, |fx, _index| total.add_assign(fx, 1i64)).unwrap();

    let count = total.get(&fx).unwrap();
    let wrong = count.eq(&fx, 9i64).unwrap();
    fx.assert_(wrong, "counted {} iterations", &[count]).unwrap();

    let fault = fx.finish().unwrap().run().unwrap_err();
    assert_eq!(fault.message, "counted 8 iterations");
}

#[test]
fn test_select_chooses_by_condition() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let chosen = fx.select(true, 3i64, 4i64).unwrap();
    let skipped = fx.select(false, 3i64, 4i64).unwrap();
    record(&fx, &seen, &[chosen, skipped]);

    fx.finish().unwrap().run().unwrap();
    assert_eq!(
        seen.borrow().as_slice(),
        &[HostValue::Int(3), HostValue::Int(4)]
    );
}

#[test]
fn test_integer_casts_narrow_and_widen() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let wide = (-300i64).to_value(&fx).unwrap();
    let narrowed = wide.cast_to(&fx, context.i32_type().into()).unwrap();
    let widened = narrowed.cast_to(&fx, context.i64_type().into()).unwrap();
    record(&fx, &seen, &[widened]);

    fx.finish().unwrap().run().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[HostValue::Int(-300)]);
}

#[test]
fn test_same_width_cast_is_identity() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let value = 42i64.to_value(&fx).unwrap();
    let cast = value.cast_to(&fx, context.i64_type().into()).unwrap();
    assert_eq!(cast.basic().unwrap(), value.basic().unwrap());

    let real = 1.5f64.to_value(&fx).unwrap();
    let recast = real.cast_to(&fx, context.f64_type().into()).unwrap();
    assert_eq!(recast.basic().unwrap(), real.basic().unwrap());
}

#[test]
fn test_unsupported_casts_are_rejected() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    // Reals are double-only; narrowing to f32 is outside the cast table.
    let real = 1.5f64.to_value(&fx).unwrap();
    assert!(matches!(
        real.cast_to(&fx, context.f32_type().into()),
        Err(EmitError::Coercion { .. })
    ));

    // Pointers convert only to pointer-width integers.
    let cells = fx.heap_allocate(context.i64_type().into(), 1i64).unwrap();
    assert!(matches!(
        cells.value().cast_to(&fx, context.i32_type().into()),
        Err(EmitError::Coercion { .. })
    ));
}

#[test]
fn test_if_treats_any_nonzero_condition_as_true() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    fx.if_(2i64, |fx| {
        record(fx, &seen, &[1i64.to_value(fx)?]);
        Ok(())
    })
    .unwrap();

    fx.finish().unwrap().run().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[HostValue::Int(1)]);
}

#[test]
fn test_real_arithmetic_round_trips() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let a = 1.5f64.to_value(&fx).unwrap();
    let quotient = a.div(&fx, 0.4f64).unwrap();
    let product = quotient.mul(&fx, 0.4f64).unwrap();
    record(&fx, &seen, &[product]);

    fx.finish().unwrap().run().unwrap();
    match seen.borrow().as_slice() {
        [HostValue::Real(x)] => assert!((x - 1.5).abs() < 1e-12),
        other => panic!("unexpected values {other:?}"),
    };
}

#[test]
fn test_nan_check_faults_on_zero_over_zero() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let mut options = BuildOptions::named("nan_check");
    options.test_for_nan = true;
    let fx = Emitter::new(&context, &arena, options).unwrap();

    let zero = 0.0f64.to_value(&fx).unwrap();
    zero.div(&fx, 0.0f64).unwrap();

    let fault = fx.finish().unwrap().run().unwrap_err();
    assert_eq!(fault.kind, FaultKind::Assertion);
    assert!(fault.message.contains("is not a number"), "{}", fault.message);
}

#[test]
fn test_stack_slot_holds_initial_value() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let initial = 42i64.to_value(&fx).unwrap();
    let slot = fx
        .stack_allocate(context.i64_type().into(), Some(initial))
        .unwrap();
    let loaded = slot.load(&fx).unwrap();
    let holds = loaded.eq(&fx, 42i64).unwrap();
    fx.assert_(holds, "slot held {}", &[loaded]).unwrap();

    fx.finish().unwrap().run().unwrap();
}

#[test]
fn test_heap_allocation_is_addressable() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let cells = fx.heap_allocate(context.i64_type().into(), 4i64).unwrap();
    let index = context.i64_type().const_int(2, false);
    let third = cells.gep(&fx, &[index]).unwrap();
    let third = stria::Ptr::new(third, context.i64_type().into());

    let seven = 7i64.to_value(&fx).unwrap();
    seven.store(&fx, third).unwrap();
    let loaded = third.load(&fx).unwrap();
    let holds = loaded.eq(&fx, 7i64).unwrap();
    fx.assert_(holds, "cell held {}", &[loaded]).unwrap();
    fx.heap_free(cells).unwrap();

    fx.finish().unwrap().run().unwrap();
}

#[test]
fn test_defined_function_is_callable_with_coercion() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let i64_ty = context.i64_type().into();
    let triple = fx
        .define_function("triple", &[i64_ty], Some(i64_ty), |fx, arguments| {
            let tripled = arguments[0].mul(fx, 3i64)?;
            fx.return_(Some(tripled))
        })
        .unwrap();

    // The i32 argument is widened to match the declared parameter.
    let narrow = 5i32.to_value(&fx).unwrap();
    let result = fx.call(&triple, &[narrow]).unwrap().unwrap();
    record(&fx, &seen, &[result]);

    fx.finish().unwrap().run().unwrap();
    assert_eq!(seen.borrow().as_slice(), &[HostValue::Int(15)]);
}

#[test]
fn test_call_arity_is_checked() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let i64_ty = context.i64_type().into();
    let identity = fx
        .define_function("identity", &[i64_ty], Some(i64_ty), |fx, arguments| {
            fx.return_(Some(arguments[0]))
        })
        .unwrap();

    assert!(matches!(
        fx.call(&identity, &[]),
        Err(EmitError::Arity {
            expected: 1,
            received: 0,
            ..
        })
    ));
}

#[test]
fn test_redefining_a_function_is_rejected() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let i64_ty = context.i64_type().into();
    fn body<'ctx>(fx: &Emitter<'ctx, '_>, arguments: &[Value<'ctx>]) -> stria::EmitResult<()> {
        fx.return_(Some(arguments[0]))
    }
    fx.define_function("once", &[i64_ty], Some(i64_ty), body)
        .unwrap();

    assert!(matches!(
        fx.define_function("once", &[i64_ty], Some(i64_ty), body),
        Err(EmitError::Redefinition { .. })
    ));
}

#[test]
fn test_define_once_reuses_the_definition() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let i64_ty = context.i64_type().into();
    fn body<'ctx>(fx: &Emitter<'ctx, '_>, arguments: &[Value<'ctx>]) -> stria::EmitResult<()> {
        fx.return_(Some(arguments[0]))
    }
    let first = fx
        .define_function_once("shared", &[i64_ty], Some(i64_ty), body)
        .unwrap();
    let second = fx
        .define_function_once("shared", &[i64_ty], Some(i64_ty), body)
        .unwrap();

    assert_eq!(first.value, second.value);
}

#[test]
fn test_named_types_are_memoized() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let first = fx
        .named_type("pair", |fx| {
            let i64_ty = fx.context().i64_type();
            Ok(fx
                .context()
                .struct_type(&[i64_ty.into(), i64_ty.into()], true)
                .into())
        })
        .unwrap();

    // The builder closure must not run again for a known name.
    let again = fx
        .named_type("pair", |fx| Ok(fx.context().f64_type().into()))
        .unwrap();
    assert_eq!(first, again);
}

#[test]
fn test_string_literals_are_interned() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();

    let first = fx.string_literal("shared text").unwrap();
    let again = fx.string_literal("shared text").unwrap();
    let different = fx.string_literal("other text").unwrap();

    assert_eq!(first.raw, again.raw);
    assert_ne!(first.raw, different.raw);
}

#[test]
fn test_math_wrappers_agree_with_host() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log_one = fx.log(1.0f64).unwrap();
    let exp_zero = fx.exp(0.0f64).unwrap();
    let log1p_e = fx.log1p(std::f64::consts::E - 1.0).unwrap();
    record(&fx, &seen, &[log_one, exp_zero, log1p_e]);

    fx.finish().unwrap().run().unwrap();
    match seen.borrow().as_slice() {
        [HostValue::Real(a), HostValue::Real(b), HostValue::Real(c)] => {
            assert!(a.abs() < 1e-12);
            assert!((b - 1.0).abs() < 1e-12);
            assert!((c - 1.0).abs() < 1e-12);
        }
        other => panic!("unexpected values {other:?}"),
    };
}

#[test]
fn test_program_runs_repeatedly() {
    init_logging();
    let context = Context::create();
    let arena = Bump::new();
    let fx = Emitter::new(&context, &arena, BuildOptions::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));

    record(&fx, &seen, &[1i64.to_value(&fx).unwrap()]);

    let compiled = fx.finish().unwrap();
    compiled.run().unwrap();
    compiled.run().unwrap();
    assert_eq!(seen.borrow().len(), 2);
}
