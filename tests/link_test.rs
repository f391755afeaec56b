//! End-to-end linking tests over Swagger documents on disk.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tf_swagger_insight::{
    build_coverage, BuildOptions, Coverage, DeclarationError, DocumentLoader, Report, SchemaAddr,
    SchemaError, SchemaTree, SchemaTreeCache, SwaggerLink, SwaggerPropertyAddr,
    TerraformPropertyAddr, TfSchema,
};

use common::{path_str, write_declarations, write_grants, write_swagger};

fn swg(s: &str) -> SwaggerPropertyAddr {
    s.parse().unwrap()
}

fn tf(s: &str) -> TerraformPropertyAddr {
    s.parse().unwrap()
}

fn vnet() -> SchemaAddr {
    SchemaAddr::new("network/vnet.json", "VirtualNetwork")
}

fn vm() -> SchemaAddr {
    SchemaAddr::new("compute/vm.json", "VirtualMachine")
}

fn links(cache: &SchemaTreeCache, schema: &SchemaAddr, rel: &str) -> Vec<String> {
    cache
        .with_tree(schema, |tree| {
            tree.property(rel)
                .map(|p| p.tf_links().iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
}

mod pipeline {
    use super::*;

    fn fixtures() -> (TempDir, BuildOptions) {
        let dir = TempDir::new().unwrap();
        let swagger = dir.path().join("swagger");
        let decls = dir.path().join("decls");
        write_swagger(&swagger);
        write_declarations(&decls);
        let options = BuildOptions::new(path_str(&swagger), &decls);
        (dir, options)
    }

    #[test]
    fn builds_coverage_from_files() {
        let (_dir, options) = fixtures();
        let outcome = build_coverage(&options).unwrap();

        assert_eq!(outcome.files, 2);
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(outcome.cache.schema_addrs(), [vm(), vnet()]);

        assert_eq!(
            outcome.cache.schema_coverage(&vnet()),
            Some(Coverage {
                covered: 4,
                total: 6
            })
        );
        assert_eq!(
            outcome.cache.schema_coverage(&vm()),
            Some(Coverage {
                covered: 2,
                total: 4
            })
        );
        assert_eq!(
            outcome
                .cache
                .find_coverage(&vnet(), &swg("VirtualNetwork:properties.subnets")),
            Some(Coverage {
                covered: 1,
                total: 2
            })
        );
    }

    #[test]
    fn links_from_several_declarations_accumulate() {
        let (_dir, options) = fixtures();
        let outcome = build_coverage(&options).unwrap();
        assert_eq!(
            links(&outcome.cache, &vnet(), "properties.subnets.name"),
            [
                "azurerm_virtual_network:subnet.name",
                "azurerm_vm_extension:subnet_name"
            ]
        );
    }

    #[test]
    fn cross_file_reference_keeps_its_document() {
        let (_dir, options) = fixtures();
        let outcome = build_coverage(&options).unwrap();
        let document = outcome
            .cache
            .with_tree(&vnet(), |tree| {
                tree.property("properties.addressSpace.addressPrefixes")
                    .unwrap()
                    .document()
                    .to_string()
            })
            .unwrap();
        assert!(document.ends_with("common/types.json"), "{document}");
    }

    #[test]
    fn discriminator_variants_are_separate_entries() {
        let (_dir, options) = fixtures();
        let outcome = build_coverage(&options).unwrap();
        let keys = outcome
            .cache
            .with_tree(&vm(), |tree| {
                tree.properties()
                    .map(|p| p.addr().relative())
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(
            keys,
            [
                "extension[Monitor]",
                "extension[Script].script",
                "extension[Script].type",
                "name"
            ]
        );
    }

    #[test]
    fn grants_reduce_totals() {
        let (dir, options) = fixtures();
        let grants = dir.path().join("grants");
        write_grants(&grants);

        let outcome = build_coverage(&options.grant_dir(&grants)).unwrap();
        assert_eq!(
            outcome.cache.schema_coverage(&vnet()),
            Some(Coverage {
                covered: 4,
                total: 5
            })
        );

        let report = outcome.cache.report();
        let property = &report[&vnet()].properties["properties.provisioningState"];
        assert!(property.is_granted);
        assert_eq!(property.grant_comment, "read only");
    }

    #[test]
    fn failing_declaration_does_not_stop_the_others() {
        let (dir, options) = fixtures();
        common::write_file(
            &dir.path().join("decls"),
            "azurerm_broken.json",
            r#"{
                "Name": "azurerm_broken",
                "swagger": "network/vnet.json",
                "PropertyLinks": { "x": [{ "prop": "VirtualNetwork:properties.nope" }] }
            }"#,
        );

        let outcome = build_coverage(&options).unwrap();
        assert_eq!(outcome.files, 3);
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert!(failure.path.ends_with("azurerm_broken.json"));
        match &failure.error {
            DeclarationError::Link {
                tf_address,
                swagger_address,
                source,
            } => {
                assert_eq!(tf_address, "azurerm_broken:x");
                assert_eq!(swagger_address, "VirtualNetwork:properties.nope");
                assert!(matches!(source, SchemaError::PropertyNotLinkable { .. }));
                assert!(!source.is_fatal());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            outcome.cache.schema_coverage(&vnet()),
            Some(Coverage {
                covered: 4,
                total: 6
            })
        );
    }

    #[test]
    fn non_canonical_swagger_base_gives_same_coverage() {
        let (dir, _) = fixtures();
        let base = format!("{}/./swagger/../swagger", path_str(dir.path()));
        let outcome = build_coverage(&BuildOptions::new(base, dir.path().join("decls"))).unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(
            outcome.cache.schema_coverage(&vnet()),
            Some(Coverage {
                covered: 4,
                total: 6
            })
        );
    }

    #[test]
    fn report_round_trips_through_json() {
        let (_dir, options) = fixtures();
        let outcome = build_coverage(&options).unwrap();
        let report = outcome.cache.report();

        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let vnet_report = &value["network/vnet.json#/definitions/VirtualNetwork"];
        assert_eq!(vnet_report["SwaggerRelPath"], "network/vnet.json");
        assert_eq!(vnet_report["Name"], "VirtualNetwork");
        assert_eq!(vnet_report["Coverage"], json!({ "Covered": 4, "Total": 6 }));
        assert_eq!(
            vnet_report["Properties"]["location"]["TFLinks"],
            json!(["azurerm_virtual_network:location"])
        );
        assert_eq!(
            vnet_report["Properties"]["properties.provisioningState"]["TFLinks"],
            json!([])
        );
    }
}

mod scenarios {
    use super::*;

    fn cache(definitions: serde_json::Value) -> SchemaTreeCache {
        let docs = HashMap::from([(
            "/specs/api.json".to_string(),
            json!({ "swagger": "2.0", "definitions": definitions }),
        )]);
        SchemaTreeCache::with_loader(Arc::new(DocumentLoader::with_source(docs)))
    }

    fn def_a() -> SchemaTreeCache {
        cache(json!({
            "def_a": {
                "properties": {
                    "p1": { "type": "object", "properties": { "p1_1": { "type": "string" } } },
                    "p2": { "type": "string" }
                }
            }
        }))
    }

    #[test]
    fn ancestor_link_then_descendant_link() {
        let cache = def_a();
        cache
            .link_schema("/specs", "api.json", &swg("def_a:p1"), &tf("res1:x"))
            .unwrap();
        cache
            .link_schema("/specs", "api.json", &swg("def_a:p1.p1_1"), &tf("res2:y"))
            .unwrap();

        let schema = SchemaAddr::new("api.json", "def_a");
        assert_eq!(links(&cache, &schema, "p1.p1_1"), ["res1:x", "res2:y"]);
    }

    #[test]
    fn grant_after_link_removes_counts() {
        let cache = def_a();
        cache
            .link_schema("/specs", "api.json", &swg("def_a:p1"), &tf("res:x"))
            .unwrap();
        cache
            .link_schema("/specs", "api.json", &swg("def_a:p2"), &tf("res:y"))
            .unwrap();

        let mut grant = tf_swagger_insight::Grant::new();
        grant.insert(
            SchemaAddr::new("api.json", "def_a"),
            tf_swagger_insight::SchemaGrant::properties([("p2", "output only")]),
        );
        cache.grant(&grant).unwrap();
        cache.calc_coverage().unwrap();

        assert_eq!(
            cache.schema_coverage(&SchemaAddr::new("api.json", "def_a")),
            Some(Coverage {
                covered: 1,
                total: 1
            })
        );
    }

    #[test]
    fn cycles_terminate_with_one_leaf() {
        let cache = cache(json!({
            "Node": {
                "properties": {
                    "self": { "$ref": "#/definitions/Node" },
                    "children": { "type": "array", "items": { "$ref": "#/definitions/Node" } },
                    "via_all_of": { "allOf": [{ "$ref": "#/definitions/Node" }] },
                    "value": { "type": "string" }
                }
            }
        }));
        for name in ["self", "children", "via_all_of"] {
            let deeper = swg(&format!("Node:{name}.value"));
            let result = cache.link_schema("/specs", "api.json", &deeper, &tf("res:x"));
            assert!(
                matches!(result, Err(SchemaError::PropertyNotLinkable { .. })),
                "{name}: {result:?}"
            );
        }
        cache.calc_coverage().unwrap();

        let keys = cache
            .with_tree(&SchemaAddr::new("api.json", "Node"), |tree| {
                tree.properties()
                    .map(|p| p.addr().relative())
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(keys, ["children", "self", "value", "via_all_of"]);
        assert_eq!(
            cache.schema_coverage(&SchemaAddr::new("api.json", "Node")),
            Some(Coverage {
                covered: 0,
                total: 4
            })
        );
    }

    #[test]
    fn primitive_schema_counts_its_root() {
        let cache = cache(json!({ "Name": { "type": "string" } }));
        cache
            .link_schema("/specs", "api.json", &swg("Name:"), &tf("res:name"))
            .unwrap();
        cache.calc_coverage().unwrap();
        assert_eq!(
            cache.schema_coverage(&SchemaAddr::new("api.json", "Name")),
            Some(Coverage {
                covered: 1,
                total: 1
            })
        );
    }

    #[test]
    fn missing_variant_is_fatal() {
        let cache = cache(json!({
            "Holder": { "properties": { "shape": { "$ref": "#/definitions/Shape" } } },
            "Shape": {
                "discriminator": "kind",
                "properties": { "kind": { "type": "string", "enum": ["Circle"] } }
            }
        }));
        let err = cache
            .link_schema("/specs", "api.json", &swg("Holder:shape.kind"), &tf("res:kind"))
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DiscriminatorVariantNotFound { .. }
        ));
        assert!(err.is_fatal());
        assert!(err.aborts_run());

        // The schema stays dropped, even for an address that was linkable.
        let holder = SchemaAddr::new("api.json", "Holder");
        assert_eq!(cache.poisoned(), [holder.clone()]);
        let later = cache.link_schema("/specs", "api.json", &swg("Holder:shape"), &tf("res:shape"));
        assert!(matches!(later, Err(SchemaError::Poisoned { .. })), "{later:?}");
        cache.calc_coverage().unwrap();
        assert!(cache.report().is_empty());
        assert_eq!(cache.schema_coverage(&holder), None);
    }

    #[test]
    fn variant_property_back_to_its_base_terminates() {
        let cache = cache(json!({
            "Holder": { "properties": { "animal": { "$ref": "#/definitions/Animal" } } },
            "Animal": {
                "discriminator": "kind",
                "properties": { "kind": { "type": "string", "enum": ["Cat", "Dog"] } }
            },
            "Cat": {
                "allOf": [{ "$ref": "#/definitions/Animal" }],
                "properties": {
                    "friend": { "$ref": "#/definitions/Animal" },
                    "meow": { "type": "string" }
                }
            },
            "Dog": {
                "allOf": [{ "$ref": "#/definitions/Animal" }],
                "properties": { "bark": { "type": "string" } }
            }
        }));
        cache
            .link_schema(
                "/specs",
                "api.json",
                &swg("Holder:animal[Cat].friend[Dog].bark"),
                &tf("res:bark"),
            )
            .unwrap();
        let result = cache.link_schema(
            "/specs",
            "api.json",
            &swg("Holder:animal[Cat].friend[Cat].meow"),
            &tf("res:meow"),
        );
        assert!(
            matches!(result, Err(SchemaError::PropertyNotLinkable { .. })),
            "{result:?}"
        );
        cache.calc_coverage().unwrap();

        let holder = SchemaAddr::new("api.json", "Holder");
        assert_eq!(
            cache.find_coverage(&holder, &swg("Holder:animal[Cat]")),
            Some(Coverage {
                covered: 1,
                total: 5
            })
        );
    }

    #[test]
    fn cross_file_cycle_from_non_canonical_base() {
        let dir = TempDir::new().unwrap();
        let swagger = dir.path().join("swagger");
        common::write_file(
            &swagger,
            "network/x.json",
            r#"{ "definitions": {
                "X": { "properties": { "b": { "$ref": "../common/b.json#/definitions/B" } } }
            } }"#,
        );
        common::write_file(
            &swagger,
            "common/b.json",
            r#"{ "definitions": {
                "B": { "properties": {
                    "x": { "$ref": "../network/x.json#/definitions/X" },
                    "name": { "type": "string" }
                } }
            } }"#,
        );
        let base = format!("{}/./swagger/../swagger/", path_str(dir.path()));
        let cache = SchemaTreeCache::new();

        cache
            .link_schema(&base, "network/x.json", &swg("X:b.x"), &tf("res:x"))
            .unwrap();
        let result = cache.link_schema(&base, "network/x.json", &swg("X:b.x.b"), &tf("res:b"));
        assert!(
            matches!(result, Err(SchemaError::PropertyNotLinkable { .. })),
            "{result:?}"
        );
        let document = cache
            .with_tree(&SchemaAddr::new("network/x.json", "X"), |tree| {
                tree.document().to_string()
            })
            .unwrap();
        assert_eq!(
            document,
            format!("{}/swagger/network/x.json", path_str(dir.path()))
        );
    }

    #[test]
    fn declaration_replay_uses_link_document_override() {
        let docs = HashMap::from([
            (
                "/specs/a.json".to_string(),
                json!({ "definitions": { "A": { "properties": { "x": { "type": "string" } } } } }),
            ),
            (
                "/specs/b.json".to_string(),
                json!({ "definitions": { "B": { "properties": { "y": { "type": "string" } } } } }),
            ),
        ]);
        let cache = SchemaTreeCache::with_loader(Arc::new(DocumentLoader::with_source(docs)));

        let mut schema = TfSchema::new("res");
        schema.swagger = "a.json".to_string();
        schema
            .property_links
            .insert("x".to_string(), vec![SwaggerLink::new(swg("A:x"))]);
        schema.property_links.insert(
            "y".to_string(),
            vec![SwaggerLink::new(swg("B:y")).in_document("b.json")],
        );
        schema.validate().unwrap();
        schema.link_swagger(&cache, "/specs").unwrap();

        assert_eq!(
            cache.schema_addrs(),
            [SchemaAddr::new("a.json", "A"), SchemaAddr::new("b.json", "B")]
        );
        assert_eq!(links(&cache, &SchemaAddr::new("b.json", "B"), "y"), ["res:y"]);
    }

    #[test]
    fn trees_can_be_built_directly() {
        let loader = Arc::new(DocumentLoader::with_source(HashMap::from([(
            "/specs/api.json".to_string(),
            json!({ "definitions": {
                "A": { "properties": { "x": { "type": "string" } } },
                "B": { "properties": { "y": { "type": "string" } } }
            } }),
        )])));
        let trees = SchemaTree::collect(loader, "/specs", "api.json", |doc| {
            doc["definitions"]
                .as_object()
                .map(|defs| defs.keys().cloned().collect())
                .unwrap_or_default()
        })
        .unwrap();
        let names: Vec<&str> = trees.iter().map(SchemaTree::name).collect();
        assert_eq!(names, ["A", "B"]);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn parallel_links_from_disk() {
        let dir = TempDir::new().unwrap();
        write_swagger(dir.path());
        let base = path_str(dir.path()).to_string();
        let cache = SchemaTreeCache::new();

        let pairs = [
            ("VirtualNetwork:location", "vnet:location"),
            ("VirtualNetwork:tags", "vnet:tags"),
            ("VirtualNetwork:properties.subnets.name", "vnet:subnet.name"),
            (
                "VirtualNetwork:properties.addressSpace.addressPrefixes",
                "vnet:address_space",
            ),
        ];
        std::thread::scope(|scope| {
            for (api, tf_addr) in pairs {
                let cache = &cache;
                let base = base.as_str();
                scope.spawn(move || {
                    cache
                        .link_schema(base, "network/vnet.json", &swg(api), &tf(tf_addr))
                        .unwrap();
                });
            }
        });
        cache.calc_coverage().unwrap();

        assert_eq!(
            cache.schema_coverage(&vnet()),
            Some(Coverage {
                covered: 4,
                total: 6
            })
        );
    }
}
