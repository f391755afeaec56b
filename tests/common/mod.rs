//! Swagger and declaration fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// `network/vnet.json`, `common/types.json` and `compute/vm.json` under `dir`.
pub fn write_swagger(dir: &Path) {
    write_file(
        dir,
        "network/vnet.json",
        r##"{
            "swagger": "2.0",
            "definitions": {
                "VirtualNetwork": {
                    "properties": {
                        "location": { "type": "string" },
                        "tags": { "type": "object", "additionalProperties": { "type": "string" } },
                        "properties": { "$ref": "#/definitions/VirtualNetworkProperties" }
                    }
                },
                "VirtualNetworkProperties": {
                    "properties": {
                        "addressSpace": { "$ref": "../common/types.json#/definitions/AddressSpace" },
                        "subnets": { "type": "array", "items": { "$ref": "#/definitions/Subnet" } },
                        "provisioningState": { "type": "string", "readOnly": true }
                    }
                },
                "Subnet": {
                    "properties": {
                        "name": { "type": "string" },
                        "next": { "$ref": "#/definitions/Subnet" }
                    }
                }
            }
        }"##,
    );
    write_file(
        dir,
        "common/types.json",
        r#"{
            "swagger": "2.0",
            "definitions": {
                "AddressSpace": {
                    "properties": {
                        "addressPrefixes": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }"#,
    );
    write_file(
        dir,
        "compute/vm.json",
        r##"{
            "swagger": "2.0",
            "definitions": {
                "VirtualMachine": {
                    "properties": {
                        "name": { "type": "string" },
                        "extension": { "$ref": "#/definitions/Extension" }
                    }
                },
                "Extension": {
                    "discriminator": "type",
                    "required": ["type"],
                    "properties": {
                        "type": { "type": "string", "enum": ["Script", "Monitor"] }
                    }
                },
                "ScriptExtension": {
                    "x-ms-discriminator-value": "Script",
                    "allOf": [{ "$ref": "#/definitions/Extension" }],
                    "properties": { "script": { "type": "string" } }
                },
                "Monitor": {
                    "allOf": [{ "$ref": "#/definitions/Extension" }],
                    "properties": { "workspace": { "type": "string" } }
                }
            }
        }"##,
    );
}

/// Declarations linking into the fixtures of [`write_swagger`].
pub fn write_declarations(dir: &Path) {
    write_file(
        dir,
        "azurerm_virtual_network.json",
        r#"{
            "Name": "azurerm_virtual_network",
            "swagger": "network/vnet.json",
            "PropertyLinks": {
                "location": [{ "prop": "VirtualNetwork:location" }],
                "address_space": [{ "prop": "VirtualNetwork:properties.addressSpace.addressPrefixes" }],
                "subnet.name": [{ "prop": "VirtualNetwork:properties.subnets.name" }],
                "tags": [{ "prop": "VirtualNetwork:tags" }],
                "id": []
            }
        }"#,
    );
    write_file(
        dir,
        "azurerm_vm_extension.json",
        r#"{
            "Name": "azurerm_vm_extension",
            "swagger": "compute/vm.json",
            "PropertyLinks": {
                "script": [{ "prop": "VirtualMachine:extension[Script].script" }],
                "type": [{ "prop": "VirtualMachine:extension[Script].type" }],
                "subnet_name": [
                    { "swagger": "network/vnet.json", "prop": "VirtualNetwork:properties.subnets.name" }
                ]
            }
        }"#,
    );
}

/// Grant of the read-only provisioning state.
pub fn write_grants(dir: &Path) {
    write_file(
        dir,
        "network/vnet.json",
        r#"{ "VirtualNetwork": { "properties": { "properties.provisioningState": "read only" } } }"#,
    );
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}
