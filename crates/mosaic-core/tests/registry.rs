//! Object registry behaviour through the bridge.

use std::collections::BTreeMap;

use mosaic_core::logging::RegistryDump;
use mosaic_core::{
    Allocator, Bridge, BridgeError, ClassId, ClassSpec, ErrorKind, IndexMiss, NewIndexMiss,
    PropertyDescriptor, Released, Value,
};

#[derive(Default)]
struct Client {
    name: String,
}

fn client_bridge() -> (Bridge, ClassId) {
    let mut bridge = Bridge::new();
    let class = bridge
        .define_class(
            ClassSpec::new("client", Allocator::default_of::<Client>())
                .index_miss(IndexMiss::nil())
                .newindex_miss(NewIndexMiss::store_field()),
        )
        .unwrap();
    bridge
        .define_property(
            class,
            PropertyDescriptor::new("name")
                .getter(|bridge, id| Ok(Value::from(bridge.entity::<Client>(id)?.name.clone())))
                .initializer(|bridge, id, value| {
                    bridge.entity_mut::<Client>(id)?.name = value.expect_str("name")?.to_owned();
                    Ok(())
                }),
        )
        .unwrap();
    bridge.seal();
    (bridge, class)
}

#[test]
fn test_balanced_reference_and_release() {
    let (mut bridge, class) = client_bridge();
    let id = bridge.allocate(class).unwrap();
    let value = Value::Object(id);

    for n in 1..=10 {
        bridge.reference(&value).unwrap();
        assert_eq!(bridge.ref_count(id), n);
    }
    for _ in 0..9 {
        assert!(matches!(bridge.release_value(&value), Released::Remaining(_)));
    }
    assert!(matches!(bridge.release_value(&value), Released::Retired(_)));

    assert!(bridge.lookup(id).is_none());
    assert_eq!(bridge.registered_count(), 0);
    // The entity itself is untouched by the registry.
    assert!(bridge.contains(id));
}

#[test]
fn test_reference_identity_is_stable() {
    let (mut bridge, class) = client_bridge();
    let id = bridge.allocate(class).unwrap();

    let first = bridge.reference_object(id).unwrap();
    let second = bridge.reference_object(id).unwrap();
    assert!(first.ptr_eq(&second));
    assert!(bridge.lookup(id).unwrap().ptr_eq(&first));
    assert_eq!(first.class(), class);
    assert_eq!(first.class_name(), "client");
}

#[test]
fn test_non_objects_pass_through() {
    let (mut bridge, _) = client_bridge();
    for value in [
        Value::Nil,
        Value::from(true),
        Value::from(3.0),
        Value::from("xterm"),
        Value::from(vec![1.0, 2.0]),
    ] {
        assert!(bridge.reference(&value).is_none());
        assert_eq!(bridge.release_value(&value), Released::Untracked);
    }
    assert_eq!(bridge.registered_count(), 0);
}

#[test]
fn test_stale_handles() {
    let (mut bridge, class) = client_bridge();
    let id = bridge.allocate(class).unwrap();
    bridge.destroy(id).unwrap();

    assert!(bridge.reference(&Value::Object(id)).is_none());
    let err = bridge.reference_object(id).unwrap_err();
    assert_eq!(err, BridgeError::StaleObject(id));
    assert_eq!(err.kind(), ErrorKind::Reference);
}

#[test]
fn test_require_representation() {
    let (mut bridge, class) = client_bridge();
    let id = bridge.allocate(class).unwrap();

    let err = bridge.require_representation(id).unwrap_err();
    assert_eq!(err, BridgeError::NotReferenced(id));
    assert_eq!(err.kind(), ErrorKind::Reference);

    let repr = bridge.reference_object(id).unwrap();
    assert!(bridge.require_representation(id).unwrap().ptr_eq(&repr));
}

#[test]
fn test_construct_exposes_and_initializes() {
    let (mut bridge, class) = client_bridge();
    let mut fields = BTreeMap::new();
    fields.insert("name".to_owned(), Value::from("xterm"));
    let id = bridge.construct(class, fields).unwrap();

    assert_eq!(bridge.ref_count(id), 1);
    assert_eq!(bridge.get(id, "name").unwrap(), Value::from("xterm"));
    // Initializer-only writes are not setters.
    assert_eq!(
        bridge.set(id, "name", Value::from("urxvt")).unwrap_err().kind(),
        ErrorKind::Attribute
    );
}

#[test]
fn test_instance_fields_are_per_entity() {
    let (mut bridge, class) = client_bridge();
    let a = bridge.allocate(class).unwrap();
    let b = bridge.allocate(class).unwrap();

    bridge.set(a, "marked", Value::from(true)).unwrap();
    assert_eq!(bridge.get(a, "marked").unwrap(), Value::from(true));
    assert_eq!(bridge.get(b, "marked").unwrap(), Value::Nil);
}

#[test]
fn test_registry_dump_after_traffic() {
    let (mut bridge, class) = client_bridge();
    let id = bridge.construct(class, BTreeMap::new()).unwrap();
    bridge.reference_object(id).unwrap();

    let dump = RegistryDump::new(&bridge).to_string();
    assert!(dump.starts_with("Registry (1 live entries):"));
    assert!(dump.contains("client: 0x"));
    assert!(dump.contains("refs=2"));
}
