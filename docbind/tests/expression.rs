use bson::{Bson, Document, doc, spec::BinarySubtype};
use chrono::{TimeZone, Utc};
use docbind::prelude::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[derive(Debug, Default)]
struct CountingDecoder {
    calls: Arc<AtomicUsize>,
}

impl DocumentDecoder for CountingDecoder {
    fn decode(&self, json: &str) -> ExpressionResult<Document> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ParameterBindingDecoder::default().decode(json)
    }
}

#[derive(Debug, Default)]
struct FailsOnceDecoder {
    calls: Arc<AtomicUsize>,
}

impl DocumentDecoder for FailsOnceDecoder {
    fn decode(&self, json: &str) -> ExpressionResult<Document> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ExpressionError::Configuration("decoder not ready".to_string()));
        }
        ParameterBindingDecoder::default().decode(json)
    }
}

#[derive(Debug, Serialize)]
struct Range {
    min: i32,
    max: i32,
}

fn resolve(expression: &str) -> Document {
    BindableExpression::new(expression).unwrap().to_document().unwrap()
}

#[rstest]
fn test_resolution_is_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TypeRegistry::builder()
        .document_decoder(CountingDecoder { calls: calls.clone() })
        .build();
    let expression = BindableExpression::new("{ $toUpper : $name }")
        .unwrap()
        .with_registry(Arc::new(registry));

    assert!(!expression.is_resolved());
    let first = expression.to_document().unwrap();
    let second = expression.to_document().unwrap();

    assert_eq!(first, second);
    assert!(expression.is_resolved());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn test_failures_are_not_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TypeRegistry::builder()
        .document_decoder(FailsOnceDecoder { calls: calls.clone() })
        .build();
    let expression = BindableExpression::new("a: 1").unwrap().with_registry(Arc::new(registry));

    assert!(matches!(expression.document(), Err(ExpressionError::Configuration(_))));
    assert!(!expression.is_resolved());
    assert_eq!(expression.document().unwrap(), &doc! { "a": 1 });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_bare_fragment_resolves_like_braced_document() {
    assert_eq!(resolve("$toUpper : $name"), resolve("{ $toUpper : $name }"));
    assert_eq!(resolve("$toUpper : $name"), doc! { "$toUpper": "$name" });
}

#[rstest]
#[case("{ a: 1 }", doc! { "a": 1 })]
#[case("  {}  ", doc! {})]
#[case("{ a: { b: 1 } }", doc! { "a": { "b": 1 } })]
fn test_braced_documents_are_not_rewrapped(#[case] expression: &str, #[case] expected: Document) {
    assert_eq!(resolve(expression), expected);
}

#[rstest]
fn test_placeholder_substitution() {
    let bound = BindableExpression::with_arguments("{ '$toUpper' : '?0' }", args!["$name"])
        .unwrap()
        .to_document()
        .unwrap();

    assert_eq!(bound, resolve("{ '$toUpper' : '$name' }"));
}

#[rstest]
fn test_arguments_keep_their_bson_types() {
    let expression = BindableExpression::with_arguments(
        "$and: [{ age: { $gte: ?0 } }, { score: { $lt: ?1 } }, { active: ?2 }, { range: ?3 }, { tags: { $in: ?4 } }, { meta: ?5 }]",
        args![
            18,
            9.5,
            true,
            Range { min: 1, max: 3 },
            vec!["a", "b"],
            serde_json::json!({ "source": "api" }),
        ],
    )
    .unwrap();

    assert_eq!(
        expression.to_document().unwrap(),
        doc! {
            "$and": [
                { "age": { "$gte": 18 } },
                { "score": { "$lt": 9.5 } },
                { "active": true },
                { "range": { "min": 1, "max": 3 } },
                { "tags": { "$in": ["a", "b"] } },
                { "meta": { "source": "api" } },
            ]
        }
    );
}

#[rstest]
fn test_bind_and_with_registry_leave_original_untouched() {
    let original = BindableExpression::new("{ '$toUpper' : '?0' }").unwrap();
    let bound = original.bind(args!["$name"]);
    let registered = original.with_registry(default_registry());

    assert_eq!(bound.document().unwrap(), &doc! { "$toUpper": "$name" });
    assert!(original.arguments().is_empty());
    assert!(original.registry().is_none());
    assert!(!original.is_resolved());
    assert_eq!(original.document().unwrap(), &doc! { "$toUpper": "?0" });
    assert_eq!(registered.expression(), original.expression());
    assert!(!registered.is_resolved());
}

#[rstest]
fn test_derived_expressions_start_unresolved() {
    let original = BindableExpression::with_arguments("{ a: ?0 }", args![1]).unwrap();
    assert_eq!(original.document().unwrap(), &doc! { "a": 1 });

    let rebound = original.bind(args![2]);
    assert!(!rebound.is_resolved());
    assert_eq!(rebound.document().unwrap(), &doc! { "a": 2 });
    assert_eq!(original.document().unwrap(), &doc! { "a": 1 });
}

#[rstest]
fn test_out_of_range_placeholder() {
    let expression = BindableExpression::with_arguments("{ a: ?0, b: ?1 }", args!["only"]).unwrap();

    assert_eq!(
        expression.document().unwrap_err(),
        ExpressionError::PlaceholderOutOfRange { index: 1, available: 1 }
    );
    assert!(!expression.is_resolved());
}

#[rstest]
fn test_placeholders_without_arguments_are_literals() {
    assert_eq!(resolve("{ a: '?0', b: ?0 }"), doc! { "a": "?0", "b": "?0" });
}

#[rstest]
#[case("$toUpper : ")]
#[case("{ a: 1 ")]
#[case("a: 'unterminated")]
fn test_malformed_expressions_fail_to_parse(#[case] expression: &str) {
    let err = BindableExpression::new(expression).unwrap().document().unwrap_err();
    assert!(matches!(err, ExpressionError::Parse { .. }), "{err:?}");
}

#[rstest]
fn test_default_registry_applies_when_arguments_are_bound() {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let id = uuid::Uuid::new_v4();
    let document = BindableExpression::with_arguments("{ since: { $gte: ?0 }, owner: ?1 }", args![date, id])
        .unwrap()
        .to_document()
        .unwrap();

    assert_eq!(
        document.get_document("since").unwrap().get("$gte"),
        Some(&Bson::DateTime(bson::DateTime::from_chrono(date)))
    );
    match document.get("owner") {
        Some(Bson::Binary(binary)) => assert_eq!(binary.subtype, BinarySubtype::Uuid),
        other => panic!("expected uuid binary, got {other:?}"),
    }
}

#[rstest]
fn test_registry_without_document_decoder_reads_plain_document() {
    let expression = BindableExpression::new("{ a: ?0, b: 1 }")
        .unwrap()
        .with_registry(default_registry());

    assert!(default_registry().document_decoder().is_none());
    assert_eq!(expression.document().unwrap(), &doc! { "a": "?0", "b": 1 });
    assert!(expression.is_resolved());
}

#[rstest]
fn test_bound_date_inside_extended_json_wrapper() {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let document = BindableExpression::with_arguments("{ at: { $date: ?0 } }", args![date])
        .unwrap()
        .to_document()
        .unwrap();

    assert_eq!(document, doc! { "at": bson::DateTime::from_chrono(date) });
}

#[rstest]
fn test_custom_registry_encoder() {
    let registry = TypeRegistry::builder()
        .encoder::<Range, _>(|range| Ok(Bson::Document(doc! { "$gte": range.min, "$lte": range.max })))
        .with_fallback(default_registry())
        .build();
    assert!(registry.has_encoder_for(std::any::TypeId::of::<Range>()));
    assert!(registry.has_encoder_for(std::any::TypeId::of::<uuid::Uuid>()));

    let expression = BindableExpression::with_arguments("{ qty: ?0 }", args![Range { min: 2, max: 5 }])
        .unwrap()
        .with_registry(Arc::new(registry));

    assert_eq!(expression.to_document().unwrap(), doc! { "qty": { "$gte": 2, "$lte": 5 } });
}

#[rstest]
fn test_concurrent_first_resolution_converges() {
    let expression = BindableExpression::with_arguments("{ $toUpper : ?0 }", args!["$name"]).unwrap();

    let documents = std::thread::scope(|scope| {
        let handles = (0..8)
            .map(|_| scope.spawn(|| expression.document().map(|document| std::ptr::from_ref(document) as usize)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(documents.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(expression.document().unwrap(), &doc! { "$toUpper": "$name" });
}

#[rstest]
fn test_mongo_expression_trait_objects() {
    let expressions: Vec<Box<dyn MongoExpression>> = vec![
        Box::new(doc! { "$literal": 1 }),
        Box::new(BindableExpression::with_arguments("$literal : ?0", args![1]).unwrap()),
    ];

    let documents = expressions
        .iter()
        .map(|expression| expression.to_document().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(documents[0], documents[1]);
}

#[rstest]
fn test_empty_expression_is_rejected() {
    assert!(matches!(BindableExpression::new(""), Err(ExpressionError::InvalidExpression(_))));
}
