//! Vector fields and nearest-neighbour queries

mod common;

use common::{open_engine, Document, User};
use recgraph::{Context, Filter, QueryParams};

async fn seed_documents(engine: &recgraph::Engine, ctx: &Context) -> Vec<u64> {
    let documents = vec![
        Document::new("apple", [0.1, 0.1, 0.1]),
        Document::new("banana", [0.0, 0.0, 0.1]),
        Document::new("cat", [0.1, 0.0, 0.0]),
        Document::new("dog", [0.1, 0.1, 0.09]),
        Document::new("elephant", [0.1, 0.1, 0.07]),
        Document::new("fox", [0.1, 0.1, 0.05]),
        Document::new("gorilla", [0.1, 0.1, 0.03]),
    ];
    let (gids, _) = engine.create_many(ctx, &documents).await.unwrap();
    gids
}

#[tokio::test]
async fn test_similar_to_returns_nearest_in_order() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();
    seed_documents(&engine, &ctx).await;

    let params = QueryParams::new()
        .with_filter(Filter::new("textVec").similar_to(vec![0.1, 0.1, 0.1], 5));
    let (gids, documents): (_, Vec<Document>) =
        engine.query_records(&ctx, &params).await.unwrap();

    let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, vec!["apple", "dog", "elephant", "fox", "gorilla"]);
    assert_eq!(gids.len(), 5);
    assert_eq!(documents[1].text_vec, vec![0.1, 0.1, 0.09]);
}

#[tokio::test]
async fn test_similar_to_respects_top_k() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();
    seed_documents(&engine, &ctx).await;

    let params =
        QueryParams::new().with_filter(Filter::new("textVec").similar_to(vec![0.0, 0.0, 1.0], 1));
    let (_, documents): (_, Vec<Document>) = engine.query_records(&ctx, &params).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].text, "banana");
}

#[tokio::test]
async fn test_vector_round_trip_is_exact() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();

    let doc = Document {
        gid: 0,
        text: "odd".to_string(),
        text_vec: vec![0.1, -3.4028235e38, 1.0e-7, 123.456],
    };
    let (gid, _) = engine.create(&ctx, &doc).await.unwrap();
    let (_, got): (u64, Document) = engine.get(&ctx, gid).await.unwrap();
    assert_eq!(got.text_vec, doc.text_vec);
}

#[tokio::test]
async fn test_similar_to_requires_vector_field() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();
    engine.create(&ctx, &User::new("A", 10, "1")).await.unwrap();

    let params = QueryParams::new().with_filter(Filter::new("name").similar_to(vec![0.1], 1));
    assert!(engine.query_records::<User>(&ctx, &params).await.is_err());
}
