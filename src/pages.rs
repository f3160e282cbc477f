use crate::{
    error::{AppError, AppResult, StoreError},
    models::{ContentRevision, DraftContent, NewRevision, Page},
    repository::RepositoryState,
};

/// CreatePageOutcome
///
/// A duplicate title is an expected result of `create_page`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePageOutcome {
    Created(i64),
    Duplicate,
}

/// PageService
///
/// The draft/publish lifecycle. Revisions are append-only; publishing moves the page's
/// `published_revision_id` pointer and never touches revision content.
#[derive(Clone)]
pub struct PageService {
    repo: RepositoryState,
}

impl PageService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// create_page
    ///
    /// Inserts the page together with its first revision. Duplicate titles are detected from
    /// the storage unique constraint rather than a pre-check, so concurrent creates of the
    /// same title cannot both succeed.
    pub async fn create_page(
        &self,
        title: &str,
        content: DraftContent,
    ) -> AppResult<CreatePageOutcome> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidArgument("title is required".into()));
        }

        match self.repo.create_page_with_revision(title, content).await {
            Ok(page_id) => {
                tracing::info!(page_id, title, "page created");
                Ok(CreatePageOutcome::Created(page_id))
            }
            Err(StoreError::UniqueViolation(_)) => {
                tracing::debug!(title, "duplicate page title");
                Ok(CreatePageOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// page_with_current_draft
    ///
    /// `(None, None)` for an unknown page, `(Some, None)` for a page without revisions,
    /// otherwise the page and its most recently created revision.
    pub async fn page_with_current_draft(
        &self,
        page_id: i64,
    ) -> AppResult<(Option<Page>, Option<ContentRevision>)> {
        let Some(page) = self.repo.find_page(page_id).await? else {
            return Ok((None, None));
        };
        let draft = self.repo.latest_revision(page.id).await?;
        Ok((Some(page), draft))
    }

    /// save_draft
    ///
    /// Appends a new revision. Revisions are immutable, so a submission that already carries
    /// a revision id is refused. Returns the new revision id.
    pub async fn save_draft(
        &self,
        page_id: i64,
        revision_id: Option<i64>,
        content: DraftContent,
    ) -> AppResult<i64> {
        if revision_id.is_some() {
            return Err(AppError::InvalidArgument(
                "you can only append to drafts".into(),
            ));
        }
        if page_id < 1 {
            return Err(AppError::InvalidArgument("page id is invalid".into()));
        }
        if self.repo.find_page(page_id).await?.is_none() {
            return Err(AppError::NotFound("page does not exist".into()));
        }

        let revision = NewRevision { page_id, content };
        match self.repo.append_revision(revision).await {
            Ok(id) => {
                tracing::info!(page_id, revision_id = id, "draft saved");
                Ok(id)
            }
            Err(StoreError::ForeignKeyViolation(_)) => {
                Err(AppError::NotFound("page does not exist".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// publish_draft
    ///
    /// Points the owning page at `revision_id`. Revisions of soft-deleted pages count as
    /// missing.
    pub async fn publish_draft(&self, revision_id: i64) -> AppResult<()> {
        // Ids start at 1, so a smaller one names no draft.
        if revision_id < 1 {
            return Err(AppError::NotFound("draft does not exist".into()));
        }
        let Some(draft) = self.repo.find_revision(revision_id).await? else {
            return Err(AppError::NotFound("draft does not exist".into()));
        };

        if !self
            .repo
            .set_published_revision(draft.page_id, draft.id)
            .await?
        {
            return Err(AppError::NotFound("draft does not exist".into()));
        }
        tracing::info!(page_id = draft.page_id, revision_id, "draft published");
        Ok(())
    }

    /// list_recently_edited
    ///
    /// One zero-based page of live pages, most recently updated first, plus the total count.
    pub async fn list_recently_edited(
        &self,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<Page>, i64)> {
        if page < 0 {
            return Err(AppError::InvalidArgument("page must not be negative".into()));
        }
        if per_page < 1 {
            return Err(AppError::InvalidArgument("per_page must be positive".into()));
        }

        let total_count = self.repo.count_pages().await?;
        let pages = self.repo.list_pages(page.saturating_mul(per_page), per_page).await?;
        Ok((pages, total_count))
    }
}
