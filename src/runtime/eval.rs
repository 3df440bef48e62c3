use std::collections::HashSet;

use serde_json::Value;

use crate::issue::{ErrorCode, Failure, Keyword, Params};
use crate::runtime::{Additional, CompiledNode, Dispatch};
use crate::types::{escape_pointer_segment, instance_type_name, is_integral, Direction};

pub(super) struct Evaluation<'a> {
    nodes: &'a [CompiledNode],
    direction: Direction,
    failures: Vec<Failure>,
    /// (dispatching node, instance address) pairs already dispatched.
    dispatched: HashSet<(usize, usize)>,
    /// Guard entries in insertion order, so a failed branch can release its own.
    undo: Vec<(usize, usize)>,
}

fn join(path: &str, key: &str) -> String {
    format!("{path}/{}", escape_pointer_segment(key))
}

fn type_matches(type_name: &str, instance: &Value) -> bool {
    match type_name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "boolean" => instance.is_boolean(),
        "number" => instance.is_number(),
        "integer" => matches!(instance, Value::Number(n) if is_integral(n)),
        "null" => instance.is_null(),
        _ => true,
    }
}

impl<'a> Evaluation<'a> {
    pub(super) fn new(nodes: &'a [CompiledNode], direction: Direction) -> Self {
        Self {
            nodes,
            direction,
            failures: Vec::new(),
            dispatched: HashSet::new(),
            undo: Vec::new(),
        }
    }

    pub(super) fn run(mut self, root: usize, instance: &Value) -> Vec<Failure> {
        self.visit(root, instance, "");
        self.failures
    }

    fn fail(&mut self, node: &CompiledNode, keyword: Keyword, code: ErrorCode, path: String, params: &Params) {
        let mut failure = Failure::new(keyword, code, params, path, &node.source);
        failure.skip = node.skip_error;
        self.failures.push(failure);
    }

    fn visit(&mut self, index: usize, instance: &Value, path: &str) {
        let nodes = self.nodes;
        let node = &nodes[index];
        let response = self.direction.is_response();

        if instance.is_null() && node.nullable {
            return;
        }
        if !instance.is_null() {
            self.check_access(node, instance, path);
        }

        if let Some(expected) = node.type_name.as_deref() {
            if !type_matches(expected, instance) {
                let unreadable_null = response && instance.is_null() && node.access.unreadable();
                if !unreadable_null {
                    let params = Params::Type {
                        expected: expected.to_string(),
                        found: instance_type_name(instance),
                    };
                    self.fail(node, Keyword::Type, ErrorCode::InvalidType, path.to_string(), &params);
                }
                return;
            }
        }

        if let Some(values) = &node.enum_values {
            self.check_enum(node, values, instance, path);
        }
        if let Some(format) = &node.format {
            if !format.is_valid(instance) {
                let params = Params::Format {
                    format: format.name().to_string(),
                    data: instance.clone(),
                };
                self.fail(node, Keyword::Format, ErrorCode::InvalidFormat, path.to_string(), &params);
            }
        }
        for check in &node.checks {
            if !check.is_valid(instance) {
                let params = check.params(instance);
                self.fail(node, check.keyword, check.keyword.error_code(), path.to_string(), &params);
            }
        }

        match instance {
            Value::Object(map) => self.visit_object(node, map, path),
            Value::Array(items) => self.visit_array(node, items, path),
            _ => {}
        }

        for &branch in &node.all_of {
            self.visit(branch, instance, path);
        }
        if !node.any_of.is_empty() {
            self.visit_any_of(node, instance, path);
        }
        if !node.one_of.is_empty() {
            self.visit_one_of(node, instance, path);
        }
        if let Some(dispatch) = &node.dispatch {
            self.dispatch(index, dispatch, instance, path);
        }
    }

    fn check_access(&mut self, node: &CompiledNode, instance: &Value, path: &str) {
        let access = node.access;
        let response = self.direction.is_response();
        let key = node
            .name
            .clone()
            .or_else(|| path.rsplit('/').next().map(crate::types::unescape_pointer_segment))
            .unwrap_or_default();
        let params = || Params::Access {
            key: key.clone(),
            value: instance.clone(),
        };

        if access.has_mutability {
            if !response && !access.valid_in_request {
                let code = ErrorCode::ReadonlyPropertyNotAllowedInRequest;
                self.fail(node, Keyword::Mutability, code, path.to_string(), &params());
            }
            if response && !access.valid_in_response {
                let code = ErrorCode::WriteonlyPropertyNotAllowedInResponse;
                self.fail(node, Keyword::Mutability, code, path.to_string(), &params());
            }
        } else if access.read_only && !response {
            let code = ErrorCode::ReadonlyPropertyNotAllowedInRequest;
            self.fail(node, Keyword::ReadOnly, code, path.to_string(), &params());
        }
        if access.secret && response {
            self.fail(node, Keyword::Secret, ErrorCode::SecretProperty, path.to_string(), &params());
        }
    }

    fn check_enum(&mut self, node: &CompiledNode, values: &[Value], instance: &Value, path: &str) {
        if values.contains(instance) {
            return;
        }
        let case_mismatch = instance.as_str().is_some_and(|s| {
            values
                .iter()
                .filter_map(Value::as_str)
                .any(|v| v.eq_ignore_ascii_case(s))
        });
        let code = if case_mismatch {
            ErrorCode::EnumCaseMismatch
        } else if node.enum_model_as_string {
            return;
        } else {
            ErrorCode::EnumMismatch
        };
        self.fail(node, Keyword::Enum, code, path.to_string(), &Params::Data(instance.clone()));
    }

    fn visit_object(&mut self, node: &CompiledNode, map: &serde_json::Map<String, Value>, path: &str) {
        let nodes = self.nodes;
        let response = self.direction.is_response();

        for key in &node.required {
            if map.contains_key(key) {
                continue;
            }
            let unreadable = node
                .properties
                .as_ref()
                .and_then(|p| p.get(key))
                .is_some_and(|&child| nodes[child].access.unreadable());
            if response && unreadable {
                continue;
            }
            let code = ErrorCode::ObjectMissingRequiredProperty;
            self.fail(node, Keyword::Required, code, join(path, key), &Params::Property(key.clone()));
        }

        for (key, required) in &node.dependencies {
            if !map.contains_key(key) {
                continue;
            }
            for missing in required.iter().filter(|m| !map.contains_key(*m)) {
                let params = Params::Dependency {
                    missing: missing.clone(),
                    key: key.clone(),
                };
                self.fail(node, Keyword::Dependencies, ErrorCode::ObjectDependencyKey, path.to_string(), &params);
            }
        }

        for (key, value) in map {
            let child_path = join(path, key);
            match node.properties.as_ref().and_then(|p| p.get(key)) {
                Some(&child) => self.visit(child, value, &child_path),
                None => match node.additional {
                    Some(Additional::Allowed(false)) => {
                        let code = ErrorCode::ObjectAdditionalProperties;
                        let params = Params::Property(key.clone());
                        self.fail(node, Keyword::AdditionalProperties, code, child_path, &params);
                    }
                    Some(Additional::Schema(schema)) => self.visit(schema, value, &child_path),
                    _ => {}
                },
            }
        }
    }

    fn visit_array(&mut self, node: &CompiledNode, items: &[Value], path: &str) {
        if let Some(item) = node.items {
            for (i, value) in items.iter().enumerate() {
                self.visit(item, value, &format!("{path}/{i}"));
            }
        }
        if node.unique_items {
            let duplicate = (0..items.len())
                .rev()
                .find_map(|i| (0..i).rev().find(|&j| items[i] == items[j]).map(|j| (i, j)));
            if let Some((i, j)) = duplicate {
                self.fail(node, Keyword::UniqueItems, ErrorCode::ArrayUnique, path.to_string(), &Params::Unique { i, j });
            }
        }
    }

    /// Evaluate one branch; returns whether it passed. Side effects of a
    /// failed branch on the dispatch guard are rolled back.
    fn branch(&mut self, index: usize, instance: &Value, path: &str) -> bool {
        let before = self.failures.len();
        let checkpoint = self.undo.len();
        self.visit(index, instance, path);
        let passed = self.failures.len() == before;
        if !passed {
            for key in self.undo.drain(checkpoint..) {
                self.dispatched.remove(&key);
            }
        }
        passed
    }

    fn visit_any_of(&mut self, node: &CompiledNode, instance: &Value, path: &str) {
        let start = self.failures.len();
        for &branch in &node.any_of {
            if self.branch(branch, instance, path) {
                self.failures.truncate(start);
                return;
            }
        }
        self.fail(node, Keyword::AnyOf, ErrorCode::AnyOfMissing, path.to_string(), &Params::None);
    }

    fn visit_one_of(&mut self, node: &CompiledNode, instance: &Value, path: &str) {
        let start = self.failures.len();
        let passed = node
            .one_of
            .iter()
            .filter(|&&branch| self.branch(branch, instance, path))
            .count();
        match passed {
            1 => self.failures.truncate(start),
            0 => self.fail(node, Keyword::OneOf, ErrorCode::OneOfMissing, path.to_string(), &Params::None),
            _ => {
                self.failures.truncate(start);
                self.fail(node, Keyword::OneOf, ErrorCode::OneOfMultiple, path.to_string(), &Params::None);
            }
        }
    }

    /// Route an object to the variant named by its tag.
    ///
    /// A missing or unknown tag falls back to the root without error. When
    /// neither the chosen schema nor the root declares
    /// `additionalProperties`, keys outside the chosen schema's properties
    /// are reported against the root.
    fn dispatch(&mut self, index: usize, dispatch: &Dispatch, instance: &Value, path: &str) {
        let Value::Object(map) = instance else {
            return;
        };
        let key = (index, instance as *const Value as usize);
        if !self.dispatched.insert(key) {
            return;
        }
        self.undo.push(key);
        let nodes = self.nodes;
        let root = &nodes[index];

        let variant = map
            .get(&dispatch.property)
            .and_then(Value::as_str)
            .and_then(|tag| dispatch.variants.get(tag).copied().flatten());
        if let Some(variant) = variant {
            self.visit(variant, instance, path);
        }

        let chosen = variant.map_or(root, |v| &nodes[v]);
        let root_has_properties = root.properties.as_ref().is_some_and(|p| !p.is_empty());
        let Some(allowed) = chosen.properties.as_ref() else {
            return;
        };
        if chosen.additional.is_some() || root.additional.is_some() || !root_has_properties {
            return;
        }
        for key in map.keys().filter(|k| !allowed.contains_key(*k)) {
            let code = ErrorCode::ObjectAdditionalProperties;
            let params = Params::Property(key.clone());
            self.fail(root, Keyword::AdditionalProperties, code, join(path, key), &params);
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::json;

    use crate::graph::SourceLocation;
    use crate::issue::ErrorCode;
    use crate::runtime::{Access, Additional, CompiledNode, CompiledValidator, Dispatch};
    use crate::types::Direction;

    fn typed(t: &str, pointer: &str) -> CompiledNode {
        CompiledNode {
            source: SourceLocation::new("spec.json", pointer),
            type_name: Some(t.into()),
            ..CompiledNode::default()
        }
    }

    fn codes(validator: &CompiledValidator, direction: Direction, instance: serde_json::Value) -> Vec<ErrorCode> {
        validator
            .evaluate(direction, &instance)
            .into_iter()
            .filter(|f| !f.skip)
            .map(|f| f.code)
            .collect()
    }

    /// Pet { petType, name } with discriminator; Dog closed with `barks`.
    fn pets() -> CompiledValidator {
        CompiledValidator::new(pet_nodes(), 0)
    }

    fn pet_nodes() -> Vec<CompiledNode> {
        let mut pet = typed("object", "/definitions/Pet");
        pet.properties = Some(IndexMap::from([("petType".to_string(), 2), ("name".to_string(), 2)]));
        pet.required = vec!["petType".into()];
        pet.dispatch = Some(Dispatch {
            property: "petType".into(),
            variants: IndexMap::from([("Pet".to_string(), None), ("Dog".to_string(), Some(1))]),
        });

        let mut dog = typed("object", "/definitions/Dog");
        dog.properties = Some(IndexMap::from([
            ("petType".to_string(), 2),
            ("name".to_string(), 2),
            ("barks".to_string(), 3),
        ]));
        dog.additional = Some(Additional::Allowed(false));

        let string = typed("string", "/definitions/Pet/properties/name");
        let boolean = typed("boolean", "/definitions/Dog/properties/barks");
        vec![pet, dog, string, boolean]
    }

    #[test]
    fn lenient_dispatch_on_missing_or_unknown_tag() {
        let v = pets();
        assert!(codes(&v, Direction::Request, json!({"petType": "Fish", "name": "x"})).is_empty());
        assert!(codes(&v, Direction::Request, json!({"petType": "Dog", "barks": true})).is_empty());
        assert_eq!(
            codes(&v, Direction::Request, json!({"petType": "Dog", "barks": "loud"})),
            vec![ErrorCode::InvalidType]
        );
    }

    #[test]
    fn extra_property_is_reported_once() {
        let v = pets();
        for payload in [
            json!({"petType": "Dog", "extra": 1}),
            json!({"petType": "Pet", "extra": 1}),
            json!({"petType": "Unknown", "extra": 1}),
        ] {
            let failures = v.evaluate(Direction::Request, &payload);
            assert_eq!(failures.len(), 1, "{payload}");
            assert_eq!(failures[0].code, ErrorCode::ObjectAdditionalProperties);
            assert_eq!(failures[0].path, "/extra");
        }
    }

    #[test]
    fn failed_branch_releases_dispatch_guard() {
        // anyOf [Pet & required owner, Pet]: the second branch must dispatch again.
        let mut nodes = pet_nodes();
        let mut with_owner = CompiledNode::default();
        with_owner.required = vec!["owner".into()];
        with_owner.all_of = vec![0];
        let mut plain = CompiledNode::default();
        plain.all_of = vec![0];
        let mut root = CompiledNode::default();
        root.any_of = vec![4, 5];
        nodes.extend([with_owner, plain, root]);
        let v = CompiledValidator::new(nodes, 6);

        assert!(codes(&v, Direction::Request, json!({"petType": "Dog", "barks": true})).is_empty());
        assert_eq!(
            codes(&v, Direction::Request, json!({"petType": "Dog", "barks": "loud"})),
            vec![
                ErrorCode::ObjectMissingRequiredProperty,
                ErrorCode::InvalidType,
                ErrorCode::InvalidType,
                ErrorCode::AnyOfMissing
            ]
        );
    }

    #[test]
    fn any_of_discards_errors_when_a_branch_passes() {
        let mut root = CompiledNode::default();
        root.any_of = vec![1, 2];
        let v = CompiledValidator::new(vec![root, typed("string", "/a"), typed("integer", "/b")], 0);

        assert!(codes(&v, Direction::Request, json!(5)).is_empty());
        assert_eq!(
            codes(&v, Direction::Request, json!(true)),
            vec![ErrorCode::InvalidType, ErrorCode::InvalidType, ErrorCode::AnyOfMissing]
        );
    }

    #[test]
    fn one_of_counts_passing_branches() {
        let mut root = CompiledNode::default();
        root.one_of = vec![1, 2];
        let v = CompiledValidator::new(vec![root, typed("number", "/a"), typed("integer", "/b")], 0);

        assert_eq!(codes(&v, Direction::Request, json!(1.5)), Vec::<ErrorCode>::new());
        assert_eq!(codes(&v, Direction::Request, json!(2)), vec![ErrorCode::OneOfMultiple]);
        assert!(codes(&v, Direction::Request, json!("x")).contains(&ErrorCode::OneOfMissing));
    }

    #[test]
    fn mutability_by_direction() {
        let mut root = typed("object", "/definitions/Vm");
        root.properties = Some(IndexMap::from([
            ("id".to_string(), 1),
            ("password".to_string(), 2),
            ("key".to_string(), 3),
        ]));
        root.required = vec!["password".into()];

        let mut id = typed("string", "/definitions/Vm/properties/id");
        id.access = Access { read_only: true, ..Access::default() };
        id.nullable = true;
        let mut password = typed("string", "/definitions/Vm/properties/password");
        password.access = Access {
            has_mutability: true,
            valid_in_request: true,
            ..Access::default()
        };
        let mut key = typed("string", "/definitions/Vm/properties/key");
        key.access = Access { secret: true, ..Access::default() };
        let v = CompiledValidator::new(vec![root, id, password, key], 0);

        assert_eq!(
            codes(&v, Direction::Request, json!({"id": "a", "password": "p"})),
            vec![ErrorCode::ReadonlyPropertyNotAllowedInRequest]
        );
        assert_eq!(
            codes(&v, Direction::Response, json!({"id": "a", "password": "p", "key": "k"})),
            vec![ErrorCode::WriteonlyPropertyNotAllowedInResponse, ErrorCode::SecretProperty]
        );
        // A write-only required property may be absent from a response.
        assert!(codes(&v, Direction::Response, json!({"id": "a"})).is_empty());
        assert!(codes(&v, Direction::Request, json!({"id": null, "password": "p"})).is_empty());

        let failure = &v.evaluate(Direction::Request, &json!({"id": "a", "password": "p"}))[0];
        assert_eq!(failure.message, "ReadOnly property `\"id\": \"a\"`, cannot be sent in the request.");
    }

    #[test]
    fn enum_case_and_model_as_string() {
        let mut color = typed("string", "/definitions/Color");
        color.enum_values = Some(vec![json!("Red"), json!("Green")]);
        let v = CompiledValidator::new(vec![color.clone()], 0);
        assert_eq!(codes(&v, Direction::Request, json!("red")), vec![ErrorCode::EnumCaseMismatch]);
        assert_eq!(codes(&v, Direction::Request, json!("Blue")), vec![ErrorCode::EnumMismatch]);

        color.enum_model_as_string = true;
        let v = CompiledValidator::new(vec![color], 0);
        assert!(codes(&v, Direction::Request, json!("Blue")).is_empty());
    }

    #[test]
    fn unique_items_reports_indexes() {
        let mut list = typed("array", "/definitions/List");
        list.unique_items = true;
        let v = CompiledValidator::new(vec![list], 0);
        let failures = v.evaluate(Direction::Request, &json!([1, 2, 1]));
        assert_eq!(failures[0].message, "Array items are not unique (indexes 2 and 0)");
    }

    #[test]
    fn nullable_accepts_null() {
        let mut name = typed("string", "/n");
        assert_eq!(
            codes(&CompiledValidator::new(vec![name.clone()], 0), Direction::Request, json!(null)),
            vec![ErrorCode::InvalidType]
        );
        name.nullable = true;
        assert!(codes(&CompiledValidator::new(vec![name], 0), Direction::Request, json!(null)).is_empty());
    }
}
