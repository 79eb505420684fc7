//! Profile-related API endpoints

use std::path::Path;

use crate::TrackLabClient;
use crate::error::Result;
use reqwest::multipart::{Form, Part};
use tracklab_core::domain::profile::{LastTrack, Profile, ProfileSummary};
use tracklab_core::dto::profile::{ProfileList, ProfileSaved, ProfileUploaded};
use tracklab_core::profile_form::ProfileForm;
use uuid::Uuid;

impl TrackLabClient {
    // =============================================================================
    // Profile Management
    // =============================================================================

    /// Upload a profile JSON file
    ///
    /// The file is sent as the `file` field of a multipart form; the backend
    /// validates it and returns the stored profile's id with the result.
    pub async fn upload_profile(&self, path: &Path) -> Result<ProfileUploaded> {
        let contents = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profile.json".to_string());

        self.upload_profile_bytes(filename, contents).await
    }

    /// Upload profile JSON held in memory under the given file name
    pub async fn upload_profile_bytes(
        &self,
        filename: impl Into<String>,
        contents: Vec<u8>,
    ) -> Result<ProfileUploaded> {
        let url = format!("{}/api/profiles", self.base_url);
        let part = Part::bytes(contents)
            .file_name(filename.into())
            .mime_str("application/json")?;
        let form = Form::new().part("file", part);
        let response = self.client.post(&url).multipart(form).send().await?;

        self.handle_response(response).await
    }

    /// List all profiles
    pub async fn list_profiles(&self) -> Result<Vec<ProfileSummary>> {
        let url = format!("{}/api/profiles", self.base_url);
        let response = self.client.get(&url).send().await?;

        let list: ProfileList = self.handle_response(response).await?;
        Ok(list.profiles)
    }

    /// Get a profile by ID
    pub async fn get_profile(&self, profile_id: Uuid) -> Result<Profile> {
        let url = format!("{}/api/profiles/{}", self.base_url, profile_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Create a profile from form data
    pub async fn create_profile(&self, form: &ProfileForm) -> Result<ProfileSaved> {
        let url = format!("{}/api/profiles/form", self.base_url);
        let response = self.client.post(&url).json(form).send().await?;

        self.handle_response(response).await
    }

    /// Replace a profile's data with form data
    pub async fn update_profile(&self, profile_id: Uuid, form: &ProfileForm) -> Result<ProfileSaved> {
        let url = format!("{}/api/profiles/{}", self.base_url, profile_id);
        let response = self.client.put(&url).json(form).send().await?;

        self.handle_response(response).await
    }

    /// Most recent track generated from a profile
    ///
    /// Returns `None` when the profile has no tracks yet.
    pub async fn last_track(&self, profile_id: Uuid) -> Result<Option<LastTrack>> {
        let url = format!("{}/api/profiles/{}/last-track", self.base_url, profile_id);
        let response = self.client.get(&url).send().await?;

        match self.handle_response(response).await {
            Ok(last) => Ok(Some(last)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
