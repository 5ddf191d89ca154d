// Warnings operators rely on when a route is misconfigured
mod common;

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axon_dispatch::{
        adapters::ReqwestSender,
        core::{HandlerChainBuilder, QosOptions, Route, pool::route_timeout},
        ports::interceptor::InterceptorRegistry,
    };

    use crate::common::{Recording, capture_warnings};

    #[test]
    fn test_missing_interceptor_is_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = InterceptorRegistry::builder()
            .route_scoped("audit", Recording::factory("audit", &log))
            .build()
            .unwrap();
        let builder = HandlerChainBuilder::new(registry);
        let route = Route::builder("/lenient")
            .interceptor("ghost")
            .interceptor("audit")
            .build();

        let (chain, output) = capture_warnings(|| builder.build(&route));

        assert_eq!(chain.names(), vec!["audit", "no_resilience"]);
        let line = output
            .lines()
            .find(|line| line.contains("interceptor=ghost"))
            .unwrap_or_else(|| panic!("no warning for the missing interceptor in:\n{output}"));
        assert!(line.contains("WARN"));
        assert!(line.contains("route=/lenient"));
        assert!(!output.contains("interceptor=audit"));
    }

    #[test]
    fn test_certificate_override_is_reported() {
        let route = Route::builder("/legacy-billing")
            .dangerous_accept_any_server_certificate(true)
            .build();

        let (sender, output) = capture_warnings(|| ReqwestSender::new(&route));

        assert!(sender.is_ok());
        assert!(output.contains("WARN"));
        assert!(output.contains("route=/legacy-billing"));
        assert!(output.contains("accepting any server certificate"));
    }

    #[test]
    fn test_verified_certificates_log_nothing() {
        let route = Route::builder("/billing").build();
        let (sender, output) = capture_warnings(|| ReqwestSender::new(&route));
        assert!(sender.is_ok());
        assert!(output.is_empty(), "unexpected output:\n{output}");
    }

    #[test]
    fn test_doubled_route_timeout_is_reported() {
        let route = Route::builder("/reports")
            .timeout(Duration::from_millis(300))
            .qos(QosOptions {
                use_qos: true,
                timeout: Some(Duration::from_millis(400)),
                exceptions_allowed_before_breaking: 3,
                duration_of_break: Duration::from_secs(1),
                break_on_server_errors: false,
            })
            .build();

        let (timeout, output) =
            capture_warnings(|| route_timeout(&route, Duration::from_secs(90)));

        assert_eq!(timeout, Duration::from_millis(800));
        assert!(output.contains("WARN"));
        assert!(output.contains("route=/reports"));
        assert!(output.contains("applied_ms=800"));
    }
}
