//! Integration tests for the inbound and outbound mappers.
//!
//! These tests verify:
//! - Outbound mapping of plain properties and unmapped properties
//! - One batched fetch per nesting level, with deduplicated ids
//! - Strict and lenient handling of unresolvable relationships
//! - Termination on reference cycles
//! - Cancellation of sibling resolutions after a failure
//! - Round trips through the mappers and the cache codec

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ngsi_core::inbound::{MockBehavior, MockEntityRepository};
use ngsi_core::{
    AttributeBinding, AttributePathResolver, AttributeValue, DescriptorBuilder, Entity,
    EntityRepository, InboundMapper, MappingConfig, MappingError, NgsiMapped, OutboundMapper, PolymorphicCacheCodec,
    Property, QueryAttributeType, Relationship, RepositoryError, UnmappedProperty,
    DEFAULT_CONTEXT,
};
use serde_json::json;
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// =============================================================================
// Domain Types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct MyPojo {
    id: String,
    my_name: Option<String>,
    numbers: Vec<i64>,
    unmapped: Vec<UnmappedProperty>,
}

impl NgsiMapped for MyPojo {
    fn describe() -> DescriptorBuilder<Self> {
        DescriptorBuilder::<Self>::new()
            .entity_types(["my-pojo"])
            .constructor(|id| MyPojo {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|p| p.id.clone())
            .entity_type(|_| "my-pojo".to_string())
            .attribute(
                AttributeBinding::<Self>::property::<String>("myName", "name")
                    .getter(|p| p.my_name.clone())
                    .setter(|p, v| p.my_name = Some(v)),
            )
            .attribute(
                AttributeBinding::<Self>::property_list::<i64>("numbers", "numbers")
                    .getter(|p| (!p.numbers.is_empty()).then(|| p.numbers.clone()))
                    .setter(|p, v| p.numbers = v),
            )
            .unmapped_properties(|p| p.unmapped.clone(), |p, v| p.unmapped.push(v))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Product {
    id: String,
    name: Option<String>,
}

impl NgsiMapped for Product {
    fn describe() -> DescriptorBuilder<Self> {
        DescriptorBuilder::<Self>::new()
            .entity_types(["product"])
            .constructor(|id| Product {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|p| p.id.clone())
            .entity_type(|_| "product".to_string())
            .relationship_object(|p| p.id.clone())
            .dataset_id(|_| None)
            .attribute(
                AttributeBinding::<Self>::property::<String>("name", "name")
                    .getter(|p| p.name.clone())
                    .setter(|p, v| p.name = Some(v)),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Store {
    id: String,
    name: Option<String>,
    products: Vec<Product>,
}

impl NgsiMapped for Store {
    fn describe() -> DescriptorBuilder<Self> {
        DescriptorBuilder::<Self>::new()
            .entity_types(["store"])
            .constructor(|id| Store {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|s| s.id.clone())
            .entity_type(|_| "store".to_string())
            .attribute(
                AttributeBinding::<Self>::property::<String>("name", "name")
                    .getter(|s| s.name.clone())
                    .setter(|s, v| s.name = Some(v)),
            )
            .attribute(
                AttributeBinding::<Self>::relationship_list::<Product>("products", "products")
                    .getter(|s| (!s.products.is_empty()).then_some(s.products.as_slice()))
                    .setter(|s, v| s.products = v),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    id: String,
    name: Option<String>,
    friend: Option<Box<Person>>,
}

impl NgsiMapped for Person {
    fn describe() -> DescriptorBuilder<Self> {
        DescriptorBuilder::<Self>::new()
            .entity_types(["person"])
            .constructor(|id| Person {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|p| p.id.clone())
            .entity_type(|_| "person".to_string())
            .relationship_object(|p| p.id.clone())
            .dataset_id(|_| None)
            .attribute(
                AttributeBinding::<Self>::property::<String>("name", "name")
                    .getter(|p| p.name.clone())
                    .setter(|p, v| p.name = Some(v)),
            )
            .attribute(
                AttributeBinding::<Self>::relationship::<Person>("friend", "friend")
                    .getter(|p| p.friend.as_deref())
                    .setter(|p, v| p.friend = Some(Box::new(v))),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Team {
    id: String,
    members: Vec<Person>,
}

impl NgsiMapped for Team {
    fn describe() -> DescriptorBuilder<Self> {
        DescriptorBuilder::<Self>::new()
            .entity_types(["team"])
            .constructor(|id| Team {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|t| t.id.clone())
            .entity_type(|_| "team".to_string())
            .attribute(
                AttributeBinding::<Self>::relationship_list::<Person>("members", "members")
                    .getter(|t| (!t.members.is_empty()).then_some(t.members.as_slice()))
                    .setter(|t, v| t.members = v),
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Shelf {
    id: String,
    slots: [Option<Product>; 5],
    highlight: Option<Product>,
}

impl NgsiMapped for Shelf {
    fn describe() -> DescriptorBuilder<Self> {
        let mut builder = DescriptorBuilder::<Self>::new()
            .entity_types(["shelf"])
            .constructor(|id| Shelf {
                id: id.to_string(),
                ..Default::default()
            })
            .id(|s| s.id.clone())
            .entity_type(|_| "shelf".to_string())
            .attribute(
                AttributeBinding::<Self>::relationship::<Product>("highlight", "highlight")
                    .from_properties()
                    .getter(|s| s.highlight.as_ref())
                    .setter(|s, v| s.highlight = Some(v)),
            );
        for slot in 0..5 {
            let name = format!("slot{slot}");
            builder = builder.attribute(
                AttributeBinding::<Self>::relationship::<Product>(name.clone(), name)
                    .getter(move |s| s.slots[slot].as_ref())
                    .setter(move |s, v| s.slots[slot] = Some(v)),
            );
        }
        builder
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Never answers for one id; every other batch goes to the wrapped mock.
struct StallingRepository {
    inner: MockEntityRepository,
    stall_on: String,
    completed: AtomicBool,
}

#[async_trait]
impl EntityRepository for StallingRepository {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, RepositoryError> {
        if ids.contains(&self.stall_on) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.completed.store(true, Ordering::SeqCst);
        }
        self.inner.fetch_by_ids(ids).await
    }
}

/// Records the name of every span opened while installed.
#[derive(Clone, Default)]
struct SpanNames(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for SpanNames {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.0.lock().unwrap().push(attrs.metadata().name().to_string());
    }
}

fn product_id(n: usize) -> String {
    format!("urn:ngsi-ld:product:{n}")
}

fn product_entity(n: usize) -> Entity {
    Entity::new(product_id(n), "product")
        .with_attribute("name", AttributeValue::property(format!("product {n}")))
}

fn store_entity(product_ids: &[String]) -> Entity {
    Entity::new("urn:ngsi-ld:store:1", "store")
        .with_attribute("name", AttributeValue::property("corner shop"))
        .with_attribute(
            "products",
            AttributeValue::RelationshipList(
                product_ids.iter().map(Relationship::new).collect(),
            ),
        )
}

fn person_entity(id: &str, name: &str, friend: &str) -> Entity {
    Entity::new(id, "person")
        .with_attribute("name", AttributeValue::property(name))
        .with_attribute("friend", Relationship::new(friend))
}

fn inbound(config: MappingConfig, repository: &Arc<MockEntityRepository>) -> InboundMapper {
    let _ = ngsi_observability::init_logging();
    InboundMapper::new(config, repository.clone())
}

// =============================================================================
// Outbound Mapping
// =============================================================================

#[test]
fn test_my_pojo_outbound() {
    let pojo = MyPojo {
        id: "urn:x:1".to_string(),
        my_name: Some("hi".to_string()),
        numbers: vec![1, 2, 3],
        unmapped: Vec::new(),
    };

    let entity = OutboundMapper::default().to_entity(&pojo).unwrap();

    let mut expected = Entity::new("urn:x:1", "my-pojo")
        .with_attribute("name", AttributeValue::property("hi"))
        .with_attribute(
            "numbers",
            AttributeValue::PropertyList(vec![Property::new(1), Property::new(2), Property::new(3)]),
        );
    expected.context = Some(DEFAULT_CONTEXT.to_string());
    assert_eq!(entity, expected);
}

#[test]
fn test_mixed_unmapped_list_fails() {
    let pojo = MyPojo {
        id: "urn:x:1".to_string(),
        unmapped: vec![UnmappedProperty::new(
            "refs",
            json!([{"id": "urn:ngsi-ld:thing:1"}, {"name": "not a reference"}]),
        )],
        ..Default::default()
    };

    let result = OutboundMapper::default().to_entity(&pojo);

    assert!(matches!(result, Err(MappingError::Mapping(_))));
}

#[test]
fn test_unmapped_list_mixing_scalars_and_objects_fails() {
    let pojo = MyPojo {
        id: "urn:x:1".to_string(),
        unmapped: vec![UnmappedProperty::new("mixed", json!([1, {"a": 1}]))],
        ..Default::default()
    };

    let result = OutboundMapper::default().to_entity(&pojo);

    assert!(matches!(result, Err(MappingError::Mapping(_))));
}

#[test]
fn test_reserved_unmapped_names_are_escaped() {
    let pojo = MyPojo {
        id: "urn:x:1".to_string(),
        unmapped: vec![UnmappedProperty::new("type", "special")],
        ..Default::default()
    };

    let entity = OutboundMapper::default().to_entity(&pojo).unwrap();

    assert_eq!(entity.entity_type, "my-pojo");
    assert_eq!(
        entity.attribute("tmfEscaped-type"),
        Some(&AttributeValue::property("special"))
    );
}

// =============================================================================
// Inbound Mapping
// =============================================================================

#[tokio::test]
async fn test_five_relationships_are_fetched_in_one_batch() {
    let repository = Arc::new(MockEntityRepository::with_entities(
        (1..=5).map(product_entity).collect(),
    ));
    let mapper = inbound(MappingConfig::default(), &repository);
    let ids: Vec<String> = (1..=5).map(product_id).collect();

    let store: Store = mapper.from_entity(store_entity(&ids)).await.unwrap();

    assert_eq!(store.name.as_deref(), Some("corner shop"));
    assert_eq!(store.products.len(), 5);
    assert_eq!(store.products[4].name.as_deref(), Some("product 5"));

    let fetches = repository.get_fetch_history().await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].ids, ids);
}

#[tokio::test]
async fn test_five_relationship_attributes_are_fetched_in_one_batch() {
    let repository = Arc::new(MockEntityRepository::with_entities(
        (1..=5).map(product_entity).collect(),
    ));
    let mapper = inbound(MappingConfig::strict(), &repository);
    let mut shelf = Entity::new("urn:ngsi-ld:shelf:1", "shelf");
    for slot in 0..5 {
        shelf = shelf.with_attribute(format!("slot{slot}"), Relationship::new(product_id(slot + 1)));
    }

    let shelf: Shelf = mapper.from_entity(shelf).await.unwrap();

    assert_eq!(
        shelf.slots[2].as_ref().and_then(|p| p.name.as_deref()),
        Some("product 3")
    );
    let fetches = repository.get_fetch_history().await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].ids, (1..=5).map(product_id).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_from_properties_relationship_is_not_fetched() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::strict(), &repository);
    let shelf = Entity::new("urn:ngsi-ld:shelf:1", "shelf").with_attribute(
        "highlight",
        Relationship::new(product_id(9))
            .with_property("name", AttributeValue::property("seasonal special")),
    );

    let shelf: Shelf = mapper.from_entity(shelf).await.unwrap();

    assert_eq!(
        shelf.highlight,
        Some(Product {
            id: product_id(9),
            name: Some("seasonal special".to_string())
        })
    );
    assert_eq!(repository.get_call_count(), 0);
}

#[tokio::test]
async fn test_mapping_and_fetch_spans_are_opened() {
    let names = SpanNames::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(names.clone()));
    let repository = Arc::new(MockEntityRepository::with_entities(vec![product_entity(1)]));
    let mapper = InboundMapper::new(MappingConfig::default(), repository.clone());

    let _: Store = mapper.from_entity(store_entity(&[product_id(1)])).await.unwrap();

    let names = names.0.lock().unwrap().clone();
    assert!(names.iter().any(|name| name == "ngsi_mapping"));
    assert!(names.iter().any(|name| name == "relationship_fetch"));
}

#[tokio::test]
async fn test_duplicate_references_are_fetched_once() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![
        product_entity(1),
        product_entity(2),
    ]));
    let mapper = inbound(MappingConfig::default(), &repository);

    let store: Store = mapper
        .from_entity(store_entity(&[product_id(1), product_id(2), product_id(1)]))
        .await
        .unwrap();

    assert_eq!(store.products.len(), 3);
    assert_eq!(store.products[0], store.products[2]);
    let fetches = repository.get_fetch_history().await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].ids, vec![product_id(1), product_id(2)]);
}

#[tokio::test]
async fn test_missing_target_is_id_only_when_lenient() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![product_entity(1)]));
    let mapper = inbound(MappingConfig::default(), &repository);

    let store: Store = mapper
        .from_entity(store_entity(&[product_id(1), product_id(2)]))
        .await
        .unwrap();

    assert_eq!(store.products[0].name.as_deref(), Some("product 1"));
    assert_eq!(
        store.products[1],
        Product {
            id: product_id(2),
            name: None
        }
    );
}

#[tokio::test]
async fn test_missing_target_fails_when_strict() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![product_entity(1)]));
    let mapper = inbound(MappingConfig::strict(), &repository);

    let result = mapper
        .from_entity::<Store>(store_entity(&[product_id(1), product_id(2)]))
        .await;

    match result {
        Err(MappingError::RelationshipUnresolved(id)) => assert_eq!(id, product_id(2)),
        other => panic!("expected an unresolved relationship, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetched_target_of_wrong_type_fails() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![Entity::new(
        product_id(1),
        "person",
    )]));
    let mapper = inbound(MappingConfig::default(), &repository);

    let result = mapper.from_entity::<Store>(store_entity(&[product_id(1)])).await;

    assert!(matches!(result, Err(MappingError::TypeMismatch { .. })));
}

#[tokio::test]
async fn test_repository_failure_fails_the_call() {
    let repository = Arc::new(MockEntityRepository::new());
    repository
        .set_behavior(MockBehavior::AlwaysFail(RepositoryError::Connection(
            "broker:1026 refused".to_string(),
        )))
        .await;
    let mapper = inbound(MappingConfig::default(), &repository);

    let result = mapper.from_entity::<Store>(store_entity(&[product_id(1)])).await;

    assert!(matches!(result, Err(MappingError::Repository(_))));
}

#[tokio::test]
async fn test_foreign_entity_type_is_rejected() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);

    let result = mapper
        .from_entity::<MyPojo>(Entity::new("urn:x:1", "other"))
        .await;

    assert!(matches!(result, Err(MappingError::TypeMismatch { .. })));
    assert_eq!(repository.get_call_count(), 0);
}

#[tokio::test]
async fn test_reference_cycle_terminates() {
    let alice = "urn:ngsi-ld:person:alice";
    let bob = "urn:ngsi-ld:person:bob";
    let repository = Arc::new(MockEntityRepository::with_entities(vec![
        person_entity(alice, "Alice", bob),
        person_entity(bob, "Bob", alice),
    ]));
    let mapper = inbound(MappingConfig::strict(), &repository);

    let person: Person = mapper
        .from_entity(person_entity(alice, "Alice", bob))
        .await
        .unwrap();

    let friend = person.friend.expect("bob should be materialized");
    assert_eq!(friend.name.as_deref(), Some("Bob"));
    let back = friend.friend.expect("alice should be referenced by id");
    assert_eq!(back.id, alice);
    assert_eq!(back.name, None);
    assert_eq!(repository.get_call_count(), 1);
}

#[tokio::test]
async fn test_unmapped_attributes_are_captured() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);
    let entity = Entity::new("urn:x:1", "my-pojo")
        .with_attribute("name", AttributeValue::property("hi"))
        .with_attribute("tmfEscaped-type", AttributeValue::property("special"));

    let pojo: MyPojo = mapper.from_entity(entity).await.unwrap();

    assert_eq!(pojo.my_name.as_deref(), Some("hi"));
    assert_eq!(pojo.unmapped, vec![UnmappedProperty::new("type", "special")]);
}

#[tokio::test]
async fn test_property_list_accepts_raw_list_and_bare_value() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);

    let raw_list = Entity::new("urn:x:1", "my-pojo")
        .with_attribute("numbers", AttributeValue::property(json!([4, 5])));
    let pojo: MyPojo = mapper.from_entity(raw_list).await.unwrap();
    assert_eq!(pojo.numbers, vec![4, 5]);

    let bare = Entity::new("urn:x:2", "my-pojo")
        .with_attribute("numbers", AttributeValue::property(7));
    let pojo: MyPojo = mapper.from_entity(bare).await.unwrap();
    assert_eq!(pojo.numbers, vec![7]);
}

#[tokio::test]
async fn test_relationship_properties_override_fetched_attributes() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![
        product_entity(1),
        product_entity(2),
    ]));
    let mapper = inbound(MappingConfig::default(), &repository);
    let store = Entity::new("urn:ngsi-ld:store:1", "store").with_attribute(
        "products",
        AttributeValue::RelationshipList(vec![
            Relationship::new(product_id(1))
                .with_property("name", AttributeValue::property("clearance")),
            Relationship::new(product_id(2)),
        ]),
    );

    let store: Store = mapper.from_entity(store).await.unwrap();

    assert_eq!(store.products[0].name.as_deref(), Some("clearance"));
    assert_eq!(store.products[1].name.as_deref(), Some("product 2"));
}

#[tokio::test]
async fn test_flattened_single_relationship_is_rejected() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);
    let person = Entity::new("urn:ngsi-ld:person:alice", "person").with_attribute(
        "friend",
        AttributeValue::property(json!({
            "type": "Relationship",
            "object": "urn:ngsi-ld:person:bob"
        })),
    );

    let result = mapper.from_entity::<Person>(person).await;

    assert!(matches!(result, Err(MappingError::Shape { .. })));
    assert_eq!(repository.get_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_branch_cancels_sibling_resolutions() {
    let alice = "urn:ngsi-ld:person:alice";
    let bob = "urn:ngsi-ld:person:bob";
    let carol = "urn:ngsi-ld:person:carol";
    let dave = "urn:ngsi-ld:person:dave";
    let inner = MockEntityRepository::with_entities(vec![
        person_entity(alice, "Alice", carol),
        person_entity(bob, "Bob", dave),
    ]);
    inner
        .set_behavior(MockBehavior::FailOn {
            ids: vec![carol.to_string()],
            error: RepositoryError::Query("carol is unavailable".to_string()),
        })
        .await;
    let repository = Arc::new(StallingRepository {
        inner,
        stall_on: dave.to_string(),
        completed: AtomicBool::new(false),
    });
    let _ = ngsi_observability::init_logging();
    let mapper = InboundMapper::new(MappingConfig::default(), repository.clone());
    let team = Entity::new("urn:ngsi-ld:team:1", "team").with_attribute(
        "members",
        AttributeValue::RelationshipList(vec![Relationship::new(alice), Relationship::new(bob)]),
    );

    let result = mapper.from_entity::<Team>(team).await;

    assert!(matches!(result, Err(MappingError::Repository(_))));
    assert!(!repository.completed.load(Ordering::SeqCst));
}

// =============================================================================
// Round Trips
// =============================================================================

#[tokio::test]
async fn test_outbound_then_inbound_round_trip() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);
    let original = MyPojo {
        id: "urn:x:1".to_string(),
        my_name: Some("hi".to_string()),
        numbers: vec![1, 2, 3],
        unmapped: vec![UnmappedProperty::new("color", "blue")],
    };

    let entity = OutboundMapper::default().to_entity(&original).unwrap();
    let restored: MyPojo = mapper.from_entity(entity).await.unwrap();

    assert_eq!(restored, original);
}

#[tokio::test]
async fn test_inbound_then_outbound_round_trip() {
    let repository = Arc::new(MockEntityRepository::new());
    let mapper = inbound(MappingConfig::default(), &repository);
    let mut original = Entity::new("urn:x:1", "my-pojo")
        .with_attribute("name", AttributeValue::property("hi"))
        .with_attribute(
            "numbers",
            AttributeValue::PropertyList(vec![Property::new(1), Property::new(2)]),
        )
        .with_attribute("color", AttributeValue::property("blue"));
    original.context = Some(DEFAULT_CONTEXT.to_string());

    let pojo: MyPojo = mapper.from_entity(original.clone()).await.unwrap();
    let entity = OutboundMapper::default().to_entity(&pojo).unwrap();

    assert_eq!(entity, original);
}

#[tokio::test]
async fn test_cached_entity_maps_like_the_original() {
    let repository = Arc::new(MockEntityRepository::with_entities(vec![product_entity(1)]));
    let mapper = inbound(MappingConfig::default(), &repository);
    let codec = PolymorphicCacheCodec;
    let entity = store_entity(&[product_id(1)]);

    let bytes = codec.encode(&entity).unwrap();
    let cached: Entity = codec.decode(&bytes).unwrap();
    let store: Store = mapper.from_entity(cached).await.unwrap();

    assert_eq!(store.products[0].name.as_deref(), Some("product 1"));
}

#[test]
fn test_id_path_short_circuits() {
    let attribute = AttributePathResolver::resolve::<Store>(&["id"]).unwrap();

    assert_eq!(attribute.path, vec!["id".to_string()]);
    assert_eq!(attribute.query_type, QueryAttributeType::String);

    let nested = AttributePathResolver::resolve_dotted::<Store>("products.name").unwrap();
    assert_eq!(nested.dotted(), "products.name");
}
