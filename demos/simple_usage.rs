//! 容器基本用法演示
//!
//! 运行：`cargo run --example simple_usage`

use std::any::Any;
use std::sync::Arc;

use weave::{
    args, BeanDefinition, Condition, Container, ContainerError, Environment, InjectionPoint,
    Invocation, MethodInterceptor, Qualifier,
};

struct AppConfig {
    database_url: String,
}

struct Database {
    url: String,
}

trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> String;
}

struct EmailNotifier;

impl Notifier for EmailNotifier {
    fn notify(&self, message: &str) -> String {
        format!("email: {message}")
    }
}

struct SmsNotifier;

impl Notifier for SmsNotifier {
    fn notify(&self, message: &str) -> String {
        format!("sms: {message}")
    }
}

struct OrderService {
    database: Arc<Database>,
    notifier: Arc<dyn Notifier>,
}

/// 打印每次调用的日志型拦截器
struct CallLogger;

impl MethodInterceptor for CallLogger {
    fn intercept(
        &self,
        invocation: &mut Invocation<'_>,
    ) -> Result<Box<dyn Any + Send>, ContainerError> {
        log::info!("-> {}::{}", invocation.bean(), invocation.method());
        let result = invocation.proceed();
        log::info!("<- {}::{}", invocation.bean(), invocation.method());
        result
    }
}

struct ReportService {
    title: String,
}

fn main() -> Result<(), ContainerError> {
    env_logger::init();

    let env = Environment::empty()
        .with("db.url", "postgres://localhost/orders")
        .with("notify.channel", "email");

    let container = Container::builder()
        .environment(env)
        .register(
            BeanDefinition::of::<AppConfig>()
                .named("config")
                .constructor(|a| {
                    Ok(AppConfig {
                        database_url: a.property("db.url")?,
                    })
                })
                .build(),
        )
        .register(
            BeanDefinition::of::<Database>()
                .named("database")
                .eager()
                .inject(InjectionPoint::one::<AppConfig>())
                .constructor(|a| {
                    let config = a.get::<AppConfig>(0)?;
                    Ok(Database {
                        url: config.database_url.clone(),
                    })
                })
                .post_construct(|db| {
                    log::info!("connected to {}", db.url);
                    Ok(())
                })
                .pre_destroy(|db| {
                    log::info!("disconnecting from {}", db.url);
                    Ok(())
                })
                .build(),
        )
        .register(
            BeanDefinition::of::<EmailNotifier>()
                .named("email")
                .condition(Condition::property_equals("notify.channel", "email"))
                .constructor(|_| Ok(EmailNotifier))
                .exposes::<dyn Notifier>(|n| n)
                .build(),
        )
        .register(
            BeanDefinition::of::<SmsNotifier>()
                .named("sms")
                .condition(Condition::property_equals("notify.channel", "sms"))
                .constructor(|_| Ok(SmsNotifier))
                .exposes::<dyn Notifier>(|n| n)
                .build(),
        )
        .register(
            BeanDefinition::of::<OrderService>()
                .named("orders")
                .inject(InjectionPoint::one::<Database>())
                .inject(InjectionPoint::one::<dyn Notifier>())
                .constructor(|a| {
                    Ok(OrderService {
                        database: a.get::<Database>(0)?,
                        notifier: a.get_trait::<dyn Notifier>(1)?,
                    })
                })
                .build(),
        )
        .register(
            BeanDefinition::of::<CallLogger>()
                .named("call-logger")
                .constructor(|_| Ok(CallLogger))
                .exposes::<dyn MethodInterceptor>(|i| i)
                .build(),
        )
        .register(
            BeanDefinition::of::<ReportService>()
                .named("reports")
                .constructor(|_| {
                    Ok(ReportService {
                        title: "daily orders".to_string(),
                    })
                })
                .intercept_method(
                    "render",
                    vec![Qualifier::name("call-logger")],
                    |svc, _| Ok(Box::new(format!("[{}]", svc.title))),
                )
                .build(),
        )
        .build();

    container.start()?;

    let orders = container.resolve::<OrderService>()?;
    println!("db url: {}", orders.database.url);
    println!("{}", orders.notifier.notify("order #42 placed"));

    // 条件装配：notify.channel=email，因此 sms 定义不可见
    let active: Arc<dyn Notifier> = container.resolve_trait()?;
    println!("{}", active.notify("channel picked by condition"));

    // 被拦截的 Bean 通过分发代理调用
    let reports = container.resolve_proxy::<ReportService>()?;
    let rendered = reports.invoke("render", args![])?;
    if let Some(text) = rendered.downcast_ref::<String>() {
        println!("report: {text}");
    }

    let stats = container.stats();
    println!(
        "resolutions={} hit_rate={:.2}",
        stats.resolutions,
        stats.singleton_hit_rate()
    );

    container.close();
    Ok(())
}
