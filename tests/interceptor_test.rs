//! 拦截器链集成测试：链序、短路、introduction Bean

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use weave::{
    args, BeanDefinition, Container, ContainerError, Invocation, MethodInterceptor, Qualifier,
};

type Trace = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct Greeter {
    greeting: String,
}

/// 记录进入/退出顺序的拦截器
struct Tracing {
    tag: &'static str,
    trace: Trace,
}

impl MethodInterceptor for Tracing {
    fn intercept(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError> {
        self.trace.lock().push(format!("{}:enter", self.tag));
        let result = invocation.proceed();
        self.trace.lock().push(format!("{}:exit", self.tag));
        result
    }
}

fn tracing_bean(name: &'static str, priority: i32, trace: &Trace) -> BeanDefinition {
    let trace = trace.clone();
    BeanDefinition::of::<Tracing>()
        .named(name)
        .priority(priority)
        .constructor(move |_| {
            Ok(Tracing {
                tag: name,
                trace: trace.clone(),
            })
        })
        .exposes::<dyn MethodInterceptor>(|i| i)
        .build()
}

fn greeter_bean(trace: &Trace, interceptors: Vec<Qualifier>) -> BeanDefinition {
    let trace = trace.clone();
    BeanDefinition::of::<Greeter>()
        .named("greeter")
        .constructor(|_| {
            Ok(Greeter {
                greeting: "hello".to_string(),
            })
        })
        .intercept_method("greet", interceptors, move |greeter, args| {
            trace.lock().push("real".to_string());
            let who = args.get::<String>(0).cloned().unwrap_or_default();
            Ok(Box::new(format!("{} {}", greeter.greeting, who)))
        })
        .build()
}

#[test]
fn chain_wraps_in_declaration_order() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(tracing_bean("b", 0, &trace))
        .register(greeter_bean(
            &trace,
            vec![Qualifier::name("a"), Qualifier::name("b")],
        ))
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    let result = proxy.invoke("greet", args!["world".to_string()]).unwrap();
    assert_eq!(result.downcast_ref::<String>().unwrap(), "hello world");
    assert_eq!(
        trace.lock().as_slice(),
        &["a:enter", "b:enter", "real", "b:exit", "a:exit"]
    );
}

#[test]
fn interceptor_priority_overrides_declaration_order() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    // 声明顺序 [a, b]，但 b 的优先级更小，先进入链
    let c = Container::builder()
        .register(tracing_bean("a", 5, &trace))
        .register(tracing_bean("b", 1, &trace))
        .register(greeter_bean(
            &trace,
            vec![Qualifier::name("a"), Qualifier::name("b")],
        ))
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    proxy.invoke("greet", args!["world".to_string()]).unwrap();
    assert_eq!(
        trace.lock().as_slice(),
        &["b:enter", "a:enter", "real", "a:exit", "b:exit"]
    );
}

#[test]
fn chain_order_is_reproducible() {
    for _ in 0..5 {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let c = Container::builder()
            .register(tracing_bean("a", 2, &trace))
            .register(tracing_bean("b", 2, &trace))
            .register(greeter_bean(
                &trace,
                vec![Qualifier::name("b"), Qualifier::name("a")],
            ))
            .build();
        let proxy = c.resolve_proxy::<Greeter>().unwrap();
        proxy.invoke("greet", args!["x".to_string()]).unwrap();
        // 优先级相同：声明顺序决定
        assert_eq!(
            trace.lock().as_slice(),
            &["b:enter", "a:enter", "real", "a:exit", "b:exit"]
        );
    }
}

/// 不调用 proceed 的短路拦截器
struct Cached;

impl MethodInterceptor for Cached {
    fn intercept(
        &self,
        _invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError> {
        Ok(Box::new("cached".to_string()))
    }
}

#[test]
fn short_circuit_skips_terminal_and_rest_of_chain() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(
            BeanDefinition::of::<Cached>()
                .named("cache")
                .constructor(|_| Ok(Cached))
                .exposes::<dyn MethodInterceptor>(|i| i)
                .build(),
        )
        .register(tracing_bean("after", 0, &trace))
        .register(greeter_bean(
            &trace,
            vec![Qualifier::name("cache"), Qualifier::name("after")],
        ))
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    let result = proxy.invoke("greet", args!["world".to_string()]).unwrap();
    assert_eq!(result.downcast_ref::<String>().unwrap(), "cached");
    assert!(trace.lock().is_empty());
}

/// 对 `add` 方法给出实现的 introduction 拦截器
struct Adder;

impl MethodInterceptor for Adder {
    fn intercept(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError> {
        let a = invocation.args().get::<i32>(0).copied().unwrap_or(0);
        let b = invocation.args().get::<i32>(1).copied().unwrap_or(0);
        Ok(Box::new(a + b))
    }
}

/// 什么也不产出的透传拦截器
struct PassThrough;

impl MethodInterceptor for PassThrough {
    fn intercept(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError> {
        invocation.proceed()
    }
}

struct Calculator;

#[test]
fn introduction_bean_is_backed_entirely_by_interceptors() {
    let c = Container::builder()
        .register(
            BeanDefinition::of::<Adder>()
                .named("adder")
                .constructor(|_| Ok(Adder))
                .exposes::<dyn MethodInterceptor>(|i| i)
                .build(),
        )
        .register(
            BeanDefinition::of::<Calculator>()
                .named("calc")
                .introduction()
                .introduction_method("add", vec![Qualifier::name("adder")])
                .build(),
        )
        .build();

    let proxy = c.resolve_proxy::<Calculator>().unwrap();
    assert!(proxy.target().is_none());
    let result = proxy.invoke("add", args![2i32, 3i32]).unwrap();
    assert_eq!(*result.downcast_ref::<i32>().unwrap(), 5);
}

#[test]
fn introduction_with_no_producing_interceptor_is_fatal() {
    let c = Container::builder()
        .register(
            BeanDefinition::of::<PassThrough>()
                .named("noop")
                .constructor(|_| Ok(PassThrough))
                .exposes::<dyn MethodInterceptor>(|i| i)
                .build(),
        )
        .register(
            BeanDefinition::of::<Calculator>()
                .named("calc")
                .introduction()
                .introduction_method("add", vec![Qualifier::name("noop")])
                .build(),
        )
        .build();

    let proxy = c.resolve_proxy::<Calculator>().unwrap();
    let err = proxy.invoke("add", args![1i32, 2i32]).unwrap_err();
    assert!(matches!(
        err,
        ContainerError::UnimplementedIntroduction { .. }
    ));
}

#[test]
fn repeated_method_declaration_merges_chains() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let first = trace.clone();
    let second = trace.clone();
    // 同名方法声明两次：拦截器追加到同一条链，后声明的终端生效
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(tracing_bean("b", 0, &trace))
        .register(
            BeanDefinition::of::<Greeter>()
                .named("greeter")
                .constructor(|_| {
                    Ok(Greeter {
                        greeting: "hello".to_string(),
                    })
                })
                .intercept_method("greet", vec![Qualifier::name("a")], move |_, _| {
                    first.lock().push("stale".to_string());
                    Ok(Box::new("stale".to_string()))
                })
                .intercept_method("greet", vec![Qualifier::name("b")], move |greeter, _| {
                    second.lock().push("real".to_string());
                    Ok(Box::new(greeter.greeting.clone()))
                })
                .build(),
        )
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    let result = proxy.invoke("greet", args![]).unwrap();
    assert_eq!(result.downcast_ref::<String>().unwrap(), "hello");
    assert_eq!(
        trace.lock().as_slice(),
        &["a:enter", "b:enter", "real", "b:exit", "a:exit"]
    );
}

#[test]
fn intercepted_bean_rejects_plain_resolution() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(greeter_bean(&trace, vec![Qualifier::name("a")]))
        .build();

    let err = c.resolve::<Greeter>().unwrap_err();
    match err {
        ContainerError::TypeMismatch { context, .. } => {
            assert!(context.contains("resolve_proxy"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_method_on_proxy_is_reported() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(greeter_bean(&trace, vec![Qualifier::name("a")]))
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    let err = proxy.invoke("farewell", args!["x".to_string()]).unwrap_err();
    match err {
        ContainerError::NoSuchMethod { bean, method } => {
            assert_eq!(bean, "greeter");
            assert_eq!(method, "farewell");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_interceptor_bean_fails_proxy_construction() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(greeter_bean(&trace, vec![Qualifier::name("ghost")]))
        .build();

    let err = c.resolve_proxy::<Greeter>().unwrap_err();
    assert!(matches!(err, ContainerError::NoSuchBean { .. }));
}

#[test]
fn lifecycle_hooks_see_the_backing_instance() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let hook_trace = trace.clone();
    let terminal_trace = trace.clone();
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(
            BeanDefinition::of::<Greeter>()
                .named("greeter")
                .constructor(|_| {
                    Ok(Greeter {
                        greeting: "hi".to_string(),
                    })
                })
                .post_construct(move |greeter| {
                    hook_trace.lock().push(format!("init:{}", greeter.greeting));
                    Ok(())
                })
                .intercept_method("greet", vec![Qualifier::name("a")], move |greeter, _| {
                    terminal_trace.lock().push("real".to_string());
                    Ok(Box::new(greeter.greeting.clone()))
                })
                .build(),
        )
        .build();

    let proxy = c.resolve_proxy::<Greeter>().unwrap();
    assert_eq!(proxy.target().unwrap().greeting, "hi");
    assert_eq!(trace.lock().first().map(String::as_str), Some("init:hi"));

    proxy.invoke("greet", args![]).unwrap();
    assert!(trace.lock().iter().any(|entry| entry == "real"));
}

#[test]
fn singleton_proxy_is_assembled_once() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let c = Container::builder()
        .register(tracing_bean("a", 0, &trace))
        .register(greeter_bean(&trace, vec![Qualifier::name("a")]))
        .build();

    let first = c.resolve_proxy::<Greeter>().unwrap();
    let second = c.resolve_proxy::<Greeter>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
