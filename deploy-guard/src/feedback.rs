//! End-user feedback and release notes.

use deploy_guard_api::{
    endpoints, FeedbackItem, FeedbackPage, FeedbackSubmission, ReleaseNotes,
    SubmitFeedbackRequest, UploadedFile,
};
use tracing::info;

use crate::error::{GuardError, GuardResult};
use crate::guard::Guard;

impl Guard {
    /// Files a feedback item under this license and machine.
    ///
    /// Attachments must be uploaded first with
    /// [`Guard::upload_feedback_file`] and referenced by their file key.
    pub async fn submit_feedback(&self, feedback: FeedbackSubmission) -> GuardResult<FeedbackItem> {
        for (name, value) in [
            ("user_id", &feedback.user_id),
            ("title", &feedback.title),
            ("content", &feedback.content),
        ] {
            if value.trim().is_empty() {
                return Err(GuardError::Config(format!("feedback {name} is required")));
            }
        }

        let request = SubmitFeedbackRequest {
            license_key: self.config.license_key.clone(),
            machine_id: self.identity.machine_id().to_string(),
            project_slug: self.config.project_slug.clone(),
            feedback,
        };
        let item: FeedbackItem = self
            .scoped(self.client.post_json(endpoints::FEEDBACKS, &request))
            .await?;
        info!(id = %item.id, category = ?item.category, "feedback submitted");
        Ok(item)
    }

    /// One page of the feedback `user_id` filed under this license.
    /// Pages start at 1.
    pub async fn list_my_feedback(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> GuardResult<FeedbackPage> {
        let query = [
            ("license_key", self.config.license_key.clone()),
            ("user_id", user_id.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let page: FeedbackPage = self
            .scoped(self.client.get_json(endpoints::FEEDBACKS, &query))
            .await?;
        Ok(page)
    }

    /// Uploads one attachment. Reference the returned `file_key` from a
    /// [`FeedbackSubmission`].
    pub async fn upload_feedback_file(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        data: impl Into<Vec<u8>>,
    ) -> GuardResult<UploadedFile> {
        if file_name.trim().is_empty() {
            return Err(GuardError::Config("file name is required".to_string()));
        }
        let fields = [
            ("license_key", self.config.license_key.clone()),
            ("project_slug", self.config.project_slug.clone()),
        ];
        let uploaded: UploadedFile = self
            .scoped(self.client.post_file(
                endpoints::FEEDBACK_UPLOAD,
                &fields,
                file_name,
                content_type,
                data.into(),
            ))
            .await?;
        if uploaded.file_key.is_empty() {
            return Err(GuardError::InvalidServerResponse(
                "upload returned no file key".to_string(),
            ));
        }
        Ok(uploaded)
    }

    /// Release notes for this project, newest first as the authority
    /// orders them.
    pub async fn fetch_release_notes(&self) -> GuardResult<ReleaseNotes> {
        let query = [("project_slug", self.config.project_slug.clone())];
        let notes: ReleaseNotes = self
            .scoped(self.client.get_json(endpoints::RELEASE_NOTES, &query))
            .await?;
        Ok(notes)
    }
}
