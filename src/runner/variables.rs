use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::env;
use std::sync::OnceLock;

use crate::config::Plan;

fn plan_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("static regex"))
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").expect("static regex"))
}

#[derive(Clone, Default)]
pub struct VariableContext {
    pub vars: IndexMap<String, String>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan_vars(mut self, plan_vars: &IndexMap<String, String>) -> Self {
        for (key, value) in plan_vars {
            let expanded = self.substitute_variables(value);
            self.vars.insert(key.clone(), expanded);
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Expands `{{name}}` from plan vars, then `${NAME:default}` from the
    /// process environment (falling back to plan vars, then the default).
    /// Unknown `{{name}}` placeholders are left untouched.
    pub fn substitute_variables(&self, text: &str) -> String {
        let result = plan_var_regex().replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            self.vars
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });

        env_var_regex()
            .replace_all(&result, |caps: &Captures| {
                let name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                env::var(name).unwrap_or_else(|_| {
                    self.vars
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| default_value.to_string())
                })
            })
            .into_owned()
    }

    /// Expands placeholders in every plan field that ends up on the wire.
    pub fn resolve_plan(&self, mut plan: Plan) -> Plan {
        plan.host = self.substitute_variables(&plan.host);
        for request in plan.requests.values_mut() {
            request.path = self.substitute_variables(&request.path);
            for value in request.query.values_mut() {
                *value = self.substitute_variables(value);
            }
            for value in request.headers.values_mut() {
                *value = self.substitute_variables(value);
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_variable_substitution() {
        let mut ctx = VariableContext::new();
        ctx.set("product", "35455");
        ctx.set("brand", "1");

        let result = ctx.substitute_variables("productId={{product}}&brandId={{brand}}");
        assert_eq!(result, "productId=35455&brandId=1");
        assert_eq!(ctx.substitute_variables("{{unknown}}"), "{{unknown}}");
    }

    #[test]
    fn test_env_variable_substitution() {
        env::set_var("PRICESTORM_TEST_HOST", "http://localhost:9090");
        let ctx = VariableContext::new();

        let result = ctx.substitute_variables("${PRICESTORM_TEST_HOST:http://fallback}");
        assert_eq!(result, "http://localhost:9090");

        let result = ctx.substitute_variables("${PRICESTORM_UNSET_VAR:http://fallback:8080}");
        assert_eq!(result, "http://fallback:8080");
    }

    #[test]
    fn test_plan_vars_can_reference_each_other() {
        let mut vars = IndexMap::new();
        vars.insert("product".to_string(), "35455".to_string());
        vars.insert("label".to_string(), "p-{{product}}".to_string());
        let ctx = VariableContext::new().with_plan_vars(&vars);
        assert_eq!(ctx.vars["label"], "p-35455");
    }

    #[test]
    fn test_resolve_builtin_plan_host() {
        let plan = VariableContext::new().resolve_plan(Plan::builtin());
        if env::var("PRICES_HOST").is_err() {
            assert_eq!(plan.host, "http://host.docker.internal:8080");
        }
        assert_eq!(plan.requests["normal"].query["productId"], "35455");
    }
}
