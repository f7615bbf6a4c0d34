//! Route extraction and validation.

use crate::declaration::{Behavior, BehaviorKind, RouteDeclaration};
use crate::error::AssemblyError;
use axum::http::Method;
use fxhash::FxHashMap;
use tracing::debug;

/// A validated route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteSpec {
    /// Id of the declaring service.
    pub service_id: String,
    pub name: String,
    pub path: String,
    /// Explicitly declared methods, if any.
    pub methods: Option<Vec<Method>>,
    pub is_async: bool,
    pub behavior: Behavior,
}

impl RouteSpec {
    /// Explicit methods, or the default set of the behavior.
    pub fn resolved_methods(&self) -> Vec<Method> {
        self.methods
            .clone()
            .unwrap_or_else(|| self.behavior.kind().default_methods())
    }
}

fn require(value: &Option<String>, field: &str, missing: &mut Vec<String>) -> String {
    if value.is_none() {
        missing.push(field.to_string());
    }

    value.clone().unwrap_or_default()
}

impl TryFrom<&RouteDeclaration> for RouteSpec {
    type Error = AssemblyError;

    fn try_from(declaration: &RouteDeclaration) -> Result<Self, Self::Error> {
        let mut missing = vec![];

        let name = require(&declaration.name, "route_name", &mut missing);
        let path = require(&declaration.path, "path", &mut missing);
        if declaration.behavior.is_none() {
            missing.push("behavior".to_string());
        }

        let behavior = match declaration.behavior {
            Some(BehaviorKind::Fetch) => Some(Behavior::Fetch {
                query: require(&declaration.query, "query", &mut missing),
            }),
            Some(BehaviorKind::Create) => Some(Behavior::Create {
                command: require(&declaration.command, "command", &mut missing),
                redirect_to: require(&declaration.redirect_to, "redirect_to", &mut missing),
            }),
            Some(BehaviorKind::CreateAndFetch) => Some(Behavior::CreateAndFetch {
                command: require(&declaration.command, "command", &mut missing),
                query: require(&declaration.query, "query", &mut missing),
                redirect_to: require(&declaration.redirect_to, "redirect_to", &mut missing),
            }),
            Some(BehaviorKind::Execute) => Some(Behavior::Execute {
                command: require(&declaration.command, "command", &mut missing),
            }),
            Some(BehaviorKind::ExecuteAndFetch) => Some(Behavior::ExecuteAndFetch {
                command: require(&declaration.command, "command", &mut missing),
                query: require(&declaration.query, "query", &mut missing),
            }),
            Some(BehaviorKind::None) => Some(Behavior::None),
            None => None,
        };

        let behavior = match behavior {
            Some(behavior) if missing.is_empty() => behavior,
            _ => {
                return Err(AssemblyError::IncompleteRouteSpec {
                    service_id: declaration.service_id.clone(),
                    missing,
                })
            }
        };

        let methods = declaration
            .methods
            .as_ref()
            .map(|methods| {
                methods
                    .iter()
                    .map(|method| {
                        Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
                            AssemblyError::InvalidRouteMethod {
                                service_id: declaration.service_id.clone(),
                                method: method.clone(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(Self {
            service_id: declaration.service_id.clone(),
            name,
            path,
            methods,
            is_async: declaration.is_async,
            behavior,
        })
    }
}

/// Validates route declarations, preserving their order. Fails on the first incomplete
/// declaration or on the first repeated route name.
pub fn extract_routes(declarations: &[RouteDeclaration]) -> Result<Vec<RouteSpec>, AssemblyError> {
    let mut declared_by: FxHashMap<String, String> = FxHashMap::default();
    let mut routes = Vec::with_capacity(declarations.len());

    for declaration in declarations {
        let route = RouteSpec::try_from(declaration)?;

        if let Some(first) = declared_by.get(&route.name) {
            return Err(AssemblyError::DuplicateRouteName {
                route_name: route.name,
                first: first.clone(),
                second: route.service_id,
            });
        }

        debug!(name = %route.name, path = %route.path, behavior = %route.behavior.kind(), "Found route.");

        declared_by.insert(route.name.clone(), route.service_id.clone());
        routes.push(route);
    }

    Ok(routes)
}

#[cfg(test)]
mod tests {
    use crate::assembly::routes::{extract_routes, RouteSpec};
    use crate::declaration::{Behavior, BehaviorKind, RouteDeclaration};
    use crate::error::AssemblyError;
    use axum::http::Method;

    #[test]
    fn should_preserve_declaration_order() {
        let routes = extract_routes(&[
            RouteDeclaration::fetch("b", "b.fetch", "/b", "FetchB"),
            RouteDeclaration::execute("a", "a.execute", "/a/{id}", "RemoveA"),
        ])
        .unwrap();

        assert_eq!(
            routes.iter().map(|route| route.name.as_str()).collect::<Vec<_>>(),
            vec!["b.fetch", "a.execute"]
        );
        assert_eq!(
            routes[1].behavior,
            Behavior::Execute {
                command: "RemoveA".to_string()
            }
        );
    }

    #[test]
    fn should_override_default_methods() {
        let routes = extract_routes(&[
            RouteDeclaration::execute("a", "a.remove", "/a/{id}", "RemoveA").methods(["delete"]),
            RouteDeclaration::execute("a", "a.update", "/a/{id}", "UpdateA"),
        ])
        .unwrap();

        assert_eq!(routes[0].resolved_methods(), vec![Method::DELETE]);
        assert_eq!(
            routes[1].resolved_methods(),
            vec![Method::PATCH, Method::PUT, Method::DELETE]
        );
    }

    #[test]
    fn should_reject_duplicate_names_in_any_order() {
        for (first, second) in [("first", "second"), ("second", "first")] {
            let error = extract_routes(&[
                RouteDeclaration::simple(first, "duplicate", "/one"),
                RouteDeclaration::simple("other", "unique", "/two"),
                RouteDeclaration::simple(second, "duplicate", "/three"),
            ])
            .unwrap_err();

            assert!(matches!(
                error,
                AssemblyError::DuplicateRouteName { route_name, first: f, second: s }
                    if route_name == "duplicate" && f == first && s == second
            ));
        }
    }

    #[test]
    fn should_report_missing_fields() {
        let error = extract_routes(&[RouteDeclaration::new("incomplete").name("route")]).unwrap_err();

        assert!(matches!(
            error,
            AssemblyError::IncompleteRouteSpec { service_id, missing }
                if service_id == "incomplete" && missing == vec!["path", "behavior"]
        ));
    }

    #[test]
    fn should_report_missing_behavior_fields() {
        let declaration = RouteDeclaration::new("create")
            .name("things.create")
            .path("/things")
            .behavior(BehaviorKind::Create)
            .command("CreateThing");

        assert!(matches!(
            RouteSpec::try_from(&declaration).unwrap_err(),
            AssemblyError::IncompleteRouteSpec { missing, .. } if missing == vec!["redirect_to"]
        ));
    }

    #[test]
    fn should_reject_invalid_methods() {
        let declaration = RouteDeclaration::simple("raw", "raw", "/raw").methods(["GE T"]);

        assert!(matches!(
            RouteSpec::try_from(&declaration).unwrap_err(),
            AssemblyError::InvalidRouteMethod { method, .. } if method == "GE T"
        ));
    }
}
