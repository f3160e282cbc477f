mod common;

use common::TestContext;
use tinypress::{
    AppError, CreatePageOutcome, StoreError,
    models::DraftContent,
    repository::Repository,
};

fn content(marker: &str) -> DraftContent {
    DraftContent {
        rendered_html: format!("<p>{marker}</p>"),
        rendered_css: "p { color: red; }".to_string(),
        editor_content: format!("{{\"text\":\"{marker}\"}}"),
    }
}

async fn create(ctx: &TestContext, title: &str) -> i64 {
    match ctx.state.pages().create_page(title, content(title)).await.unwrap() {
        CreatePageOutcome::Created(id) => id,
        CreatePageOutcome::Duplicate => panic!("unexpected duplicate for {title}"),
    }
}

#[tokio::test]
async fn test_create_page_stores_first_revision() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "Home").await;

    let (page, draft) = ctx.state.pages().page_with_current_draft(page_id).await.unwrap();
    let page = page.unwrap();
    let draft = draft.unwrap();

    assert_eq!(page.title, "Home");
    assert_eq!(page.published_revision_id, None);
    assert_eq!(draft.page_id, page_id);
    assert_eq!(draft.rendered_html, "<p>Home</p>");
}

#[tokio::test]
async fn test_duplicate_title_is_an_outcome_not_an_error() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "Home").await;

    let outcome = ctx
        .state
        .pages()
        .create_page("Home", content("second"))
        .await
        .unwrap();
    assert_eq!(outcome, CreatePageOutcome::Duplicate);

    let pages = ctx.repo.pages_titled("Home").await;
    assert_eq!(pages.len(), 1);
    let revisions = ctx.repo.revisions_for_page(page_id).await;
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].rendered_html, "<p>Home</p>");
}

#[tokio::test]
async fn test_create_page_trims_and_requires_title() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "  About  ").await;
    let page = ctx.repo.find_page(page_id).await.unwrap().unwrap();
    assert_eq!(page.title, "About");

    let result = ctx.state.pages().create_page("   ", content("x")).await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_unknown_page_yields_nothing() {
    let ctx = TestContext::new();
    let (page, draft) = ctx.state.pages().page_with_current_draft(999).await.unwrap();
    assert!(page.is_none());
    assert!(draft.is_none());
}

#[tokio::test]
async fn test_save_draft_appends_without_overwriting() {
    let ctx = TestContext::new();
    let pages = ctx.state.pages();
    let page_id = create(&ctx, "Blog").await;

    let first = pages.save_draft(page_id, None, content("same")).await.unwrap();
    let second = pages.save_draft(page_id, None, content("same")).await.unwrap();
    assert_ne!(first, second);

    let revisions = ctx.repo.revisions_for_page(page_id).await;
    assert_eq!(revisions.len(), 3);
    assert!(revisions.iter().any(|r| r.id == first));
    assert!(revisions.iter().any(|r| r.id == second));

    let (_, draft) = pages.page_with_current_draft(page_id).await.unwrap();
    assert_eq!(draft.unwrap().id, second);
}

#[tokio::test]
async fn test_save_draft_with_revision_id_is_rejected() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "Contact").await;
    let existing = ctx.repo.latest_revision(page_id).await.unwrap().unwrap();

    let result = ctx
        .state
        .pages()
        .save_draft(page_id, Some(existing.id), content("edit"))
        .await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    assert_eq!(ctx.repo.revisions_for_page(page_id).await.len(), 1);
}

#[tokio::test]
async fn test_save_draft_for_unknown_page_is_not_found() {
    let ctx = TestContext::new();
    let result = ctx.state.pages().save_draft(42, None, content("x")).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_publish_moves_only_the_pointer() {
    let ctx = TestContext::new();
    let pages = ctx.state.pages();
    let page_id = create(&ctx, "Landing").await;
    let draft_id = pages.save_draft(page_id, None, content("v2")).await.unwrap();
    let before = ctx.repo.revisions_for_page(page_id).await;

    pages.publish_draft(draft_id).await.unwrap();

    let page = ctx.repo.find_page(page_id).await.unwrap().unwrap();
    assert_eq!(page.published_revision_id, Some(draft_id));
    assert_eq!(ctx.repo.revisions_for_page(page_id).await, before);
}

#[tokio::test]
async fn test_publish_only_touches_owning_page() {
    let ctx = TestContext::new();
    let pages = ctx.state.pages();
    let a = create(&ctx, "A").await;
    let b = create(&ctx, "B").await;
    let draft = ctx.repo.latest_revision(a).await.unwrap().unwrap();

    pages.publish_draft(draft.id).await.unwrap();

    let page_b = ctx.repo.find_page(b).await.unwrap().unwrap();
    assert_eq!(page_b.published_revision_id, None);
}

#[tokio::test]
async fn test_publish_unknown_draft_is_not_found_and_changes_nothing() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "Stable").await;

    let result = ctx.state.pages().publish_draft(9999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let page = ctx.repo.find_page(page_id).await.unwrap().unwrap();
    assert_eq!(page.published_revision_id, None);
}

#[tokio::test]
async fn test_publish_non_positive_id_is_not_found() {
    let ctx = TestContext::new();
    for id in [0, -5] {
        let result = ctx.state.pages().publish_draft(id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))), "id {id}");
    }
}

#[tokio::test]
async fn test_publish_draft_of_deleted_page_is_not_found() {
    let ctx = TestContext::new();
    let page_id = create(&ctx, "Retired").await;
    let draft = ctx.repo.latest_revision(page_id).await.unwrap().unwrap();
    assert!(ctx.repo.soft_delete_page(page_id).await);

    let result = ctx.state.pages().publish_draft(draft.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_list_recently_edited_pages() {
    let ctx = TestContext::new();
    let mut ids = Vec::new();
    for n in 0..25 {
        ids.push(create(&ctx, &format!("Page {n}")).await);
    }
    let pages = ctx.state.pages();

    let (first, total) = pages.list_recently_edited(0, 10).await.unwrap();
    assert_eq!(total, 25);
    assert_eq!(first.len(), 10);
    let newest_first: Vec<i64> = ids.iter().rev().take(10).copied().collect();
    assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), newest_first);

    let (last, total) = pages.list_recently_edited(2, 10).await.unwrap();
    assert_eq!(total, 25);
    assert_eq!(last.len(), 5);
    let oldest: Vec<i64> = ids.iter().take(5).rev().copied().collect();
    assert_eq!(last.iter().map(|p| p.id).collect::<Vec<_>>(), oldest);
}

#[tokio::test]
async fn test_saving_a_draft_bumps_page_to_the_top() {
    let ctx = TestContext::new();
    let pages = ctx.state.pages();
    let old = create(&ctx, "Old").await;
    create(&ctx, "New").await;

    pages.save_draft(old, None, content("edit")).await.unwrap();

    let (listed, _) = pages.list_recently_edited(0, 10).await.unwrap();
    assert_eq!(listed[0].id, old);
}

#[tokio::test]
async fn test_list_rejects_bad_paging() {
    let ctx = TestContext::new();
    let pages = ctx.state.pages();
    assert!(matches!(
        pages.list_recently_edited(-1, 10).await,
        Err(AppError::InvalidArgument(_))
    ));
    assert!(matches!(
        pages.list_recently_edited(0, 0).await,
        Err(AppError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_storage_failure_is_not_a_duplicate() {
    let ctx = TestContext::new();
    ctx.repo.set_failing(true);

    let result = ctx.state.pages().create_page("Home", content("x")).await;
    assert!(matches!(
        result,
        Err(AppError::Storage(StoreError::Unavailable(_)))
    ));
}
