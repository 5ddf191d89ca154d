use std::{collections::HashSet, time::Duration};

use crate::{
    config::models::{DispatchConfig, DispatchSettings, RouteDefinition},
    core::route::{DownstreamAddress, HttpHandlerOptions, QosOptions, Route},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid duration '{value}' for '{field}': {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Turns configuration definitions into runtime routes.
pub struct RouteValidator;

impl RouteValidator {
    /// Validate the whole configuration and build every route.
    pub fn validate(config: &DispatchConfig) -> ValidationResult<(DispatchSettings, Vec<Route>)> {
        let mut errors = Vec::new();

        let default_timeout = match parse_duration("default_timeout", &config.default_timeout) {
            Ok(timeout) if timeout.is_zero() => {
                errors.push(ValidationError::InvalidField {
                    field: "default_timeout".to_string(),
                    message: "Must be greater than zero".to_string(),
                });
                None
            }
            Ok(timeout) => Some(timeout),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut names = HashSet::new();
        let mut routes = Vec::with_capacity(config.routes.len());
        for definition in &config.routes {
            if !definition.name.is_empty() && !names.insert(definition.name.as_str()) {
                errors.push(ValidationError::RouteConflict {
                    message: format!("Route '{}' is defined more than once", definition.name),
                });
            }
            match Self::validate_route(definition) {
                Ok(route) => routes.push(route),
                Err(mut route_errors) => errors.append(&mut route_errors),
            }
        }

        match default_timeout {
            Some(default_timeout) if errors.is_empty() => {
                Ok((DispatchSettings { default_timeout }, routes))
            }
            _ => Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            }),
        }
    }

    /// Validate a single route definition, reporting every problem found.
    pub fn validate_route(definition: &RouteDefinition) -> Result<Route, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let name = &definition.name;

        if name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "route name".to_string(),
            });
        }

        let mut downstream_addresses = Vec::new();
        for (i, address) in definition.downstream_addresses.iter().enumerate() {
            match address.parse::<DownstreamAddress>() {
                Ok(parsed) => downstream_addresses.push(parsed),
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: format!("route '{name}' downstream address {}", i + 1),
                    message: e.to_string(),
                }),
            }
        }

        let mut seen = HashSet::new();
        for interceptor in &definition.interceptors {
            if !seen.insert(interceptor.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{name}' interceptors"),
                    message: format!("Interceptor '{interceptor}' is listed more than once"),
                });
            }
        }

        let options = &definition.handler_options;
        if options.max_connections_per_server == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{name}' max_connections_per_server"),
                message: "Must be greater than zero".to_string(),
            });
        }
        let pooled_connection_lifetime = collect(
            &mut errors,
            parse_duration(
                &format!("route '{name}' pooled_connection_lifetime"),
                &options.pooled_connection_lifetime,
            ),
        );

        let timeout = collect(
            &mut errors,
            parse_optional_duration(&format!("route '{name}' timeout"), definition.timeout.as_deref()),
        );
        if timeout.flatten().is_some_and(|timeout| timeout.is_zero()) {
            errors.push(ValidationError::InvalidField {
                field: format!("route '{name}' timeout"),
                message: "Must be greater than zero".to_string(),
            });
        }

        let qos = &definition.qos;
        let qos_timeout = collect(
            &mut errors,
            parse_optional_duration(&format!("route '{name}' qos timeout"), qos.timeout.as_deref()),
        );
        let duration_of_break = collect(
            &mut errors,
            parse_duration(&format!("route '{name}' qos duration_of_break"), &qos.duration_of_break),
        );

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Route {
            name: name.clone(),
            downstream_addresses,
            interceptor_order: definition.interceptors.clone(),
            handler_options: HttpHandlerOptions {
                allow_auto_redirect: options.allow_auto_redirect,
                use_cookie_container: options.use_cookie_container,
                use_proxy: options.use_proxy,
                use_tracing: options.use_tracing,
                max_connections_per_server: options.max_connections_per_server,
                pooled_connection_lifetime: pooled_connection_lifetime.unwrap_or_default(),
            },
            qos: QosOptions {
                use_qos: qos.is_enabled(),
                timeout: qos_timeout.flatten(),
                exceptions_allowed_before_breaking: qos.exceptions_allowed_before_breaking,
                duration_of_break: duration_of_break.unwrap_or_default(),
                break_on_server_errors: qos.break_on_server_errors,
            },
            timeout: timeout.flatten(),
            dangerous_accept_any_server_certificate: definition
                .dangerous_accept_any_server_certificate,
        })
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

fn collect<T>(errors: &mut Vec<ValidationError>, result: ValidationResult<T>) -> Option<T> {
    result.map_err(|e| errors.push(e)).ok()
}

fn parse_duration(field: &str, value: &str) -> ValidationResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| ValidationError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_optional_duration(field: &str, value: Option<&str>) -> ValidationResult<Option<Duration>> {
    value.map(|v| parse_duration(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{HandlerOptionsDefinition, QosDefinition};

    fn valid_definition() -> RouteDefinition {
        RouteDefinition {
            name: "/users".to_string(),
            downstream_addresses: vec!["http://users.internal:8080".to_string()],
            interceptors: vec!["auth".to_string()],
            handler_options: HandlerOptionsDefinition::default(),
            qos: QosDefinition {
                timeout: Some("250ms".to_string()),
                exceptions_allowed_before_breaking: 3,
                ..QosDefinition::default()
            },
            timeout: Some("2s".to_string()),
            dangerous_accept_any_server_certificate: false,
        }
    }

    #[test]
    fn validate_builds_route_from_definition() {
        let route = RouteValidator::validate_route(&valid_definition()).unwrap();

        assert_eq!(route.name, "/users");
        assert_eq!(route.downstream_addresses[0].authority(), "users.internal:8080");
        assert_eq!(route.timeout, Some(Duration::from_secs(2)));
        assert!(route.qos.use_qos);
        assert_eq!(route.qos.timeout, Some(Duration::from_millis(250)));
        assert_eq!(route.qos.duration_of_break, Duration::from_secs(5));
        assert_eq!(
            route.handler_options.pooled_connection_lifetime,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn validate_rejects_zero_route_timeout() {
        let mut definition = valid_definition();
        definition.timeout = Some("0s".to_string());

        let errors = RouteValidator::validate_route(&definition).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidField { field, .. } if field == "route '/users' timeout"
        ));
    }

    #[test]
    fn validate_reports_every_problem() {
        let mut definition = valid_definition();
        definition.downstream_addresses.push("ftp://files".to_string());
        definition.interceptors.push("auth".to_string());
        definition.timeout = Some("soon".to_string());
        definition.handler_options.max_connections_per_server = Some(0);

        let errors = RouteValidator::validate_route(&definition).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidDuration { value, .. } if value == "soon"))
        );
    }

    #[test]
    fn validate_rejects_duplicate_route_names() {
        let config = DispatchConfig {
            default_timeout: "90s".to_string(),
            routes: vec![valid_definition(), valid_definition()],
        };
        let err = RouteValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn validate_rejects_zero_default_timeout() {
        let config = DispatchConfig {
            default_timeout: "0s".to_string(),
            routes: vec![],
        };
        assert!(RouteValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_returns_settings() {
        let config = DispatchConfig {
            default_timeout: "30s".to_string(),
            routes: vec![valid_definition()],
        };
        let (settings, routes) = RouteValidator::validate(&config).unwrap();
        assert_eq!(settings.default_timeout, Duration::from_secs(30));
        assert_eq!(routes.len(), 1);
    }
}
