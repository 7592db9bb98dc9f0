use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use crate::{
    cli::{AddVideoArgs, VideoArgs},
    db::{DanceVideo, FavoriteVideo, NewDanceVideo, VideoFilter, DIFFICULTIES},
    AppState,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub video_id: i64,
    pub is_favorite: bool,
}

pub async fn list_videos(state: &AppState, args: VideoArgs) -> Result<Vec<DanceVideo>> {
    let filter = VideoFilter {
        category: args.category,
        difficulty: args.difficulty,
        search: args.search,
    };
    state.db.list_videos(&filter).await
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub async fn add_video(state: &AppState, args: AddVideoArgs) -> Result<DanceVideo> {
    let title = args.title.trim().to_string();
    let video_url = args.url.trim().to_string();
    let category = args.category.trim().to_lowercase();
    let difficulty = args.difficulty.trim().to_lowercase();

    if title.is_empty() || video_url.is_empty() || category.is_empty() {
        bail!("title, url and category are required");
    }
    if !DIFFICULTIES.contains(&difficulty.as_str()) {
        bail!(
            "difficulty must be one of {}, got '{difficulty}'",
            DIFFICULTIES.join(", ")
        );
    }

    let video = NewDanceVideo {
        title,
        artist: non_empty(args.artist),
        description: non_empty(args.description),
        video_url,
        thumbnail_url: non_empty(args.thumbnail_url),
        difficulty,
        duration_secs: args.duration_secs,
        category,
        bpm: args.bpm,
        steps: args
            .steps
            .into_iter()
            .map(|step| step.trim().to_string())
            .filter(|step| !step.is_empty())
            .collect(),
    };
    state.db.insert_video(&video).await
}

pub async fn get_video(state: &AppState, video_id: i64) -> Result<DanceVideo> {
    state
        .db
        .get_video(video_id)
        .await?
        .ok_or_else(|| anyhow!("video {video_id} not found"))
}

pub async fn toggle_favorite(state: &AppState, video_id: i64) -> Result<FavoriteToggle> {
    let is_favorite = state.db.toggle_favorite(&state.user_id, video_id).await?;
    Ok(FavoriteToggle {
        video_id,
        is_favorite,
    })
}

pub async fn list_favorites(state: &AppState) -> Result<Vec<FavoriteVideo>> {
    state.db.list_favorites(&state.user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    fn bachata() -> AddVideoArgs {
        AddVideoArgs {
            title: " Bachata Basics ".into(),
            url: "https://example.com/bachata".into(),
            difficulty: "Beginner".into(),
            duration_secs: 200,
            category: "Latin".into(),
            artist: Some("".into()),
            description: Some("Side to side with a tap".into()),
            thumbnail_url: None,
            bpm: Some(128),
            steps: vec!["Side".into(), " ".into(), "Tap".into()],
        }
    }

    #[tokio::test]
    async fn test_added_video_is_listed() {
        let state = test_state().await;
        let added = add_video(&state, bachata()).await.unwrap();
        assert_eq!(added.title, "Bachata Basics");
        assert_eq!(added.difficulty, "beginner");
        assert_eq!(added.artist, None);
        assert_eq!(added.steps, vec!["Side", "Tap"]);

        let latin = list_videos(
            &state,
            VideoArgs {
                category: Some("latin".into()),
                ..VideoArgs::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(latin.len(), 2);
        assert!(latin.contains(&added));
        assert_eq!(get_video(&state, added.id).await.unwrap(), added);
    }

    #[tokio::test]
    async fn test_add_video_validates() {
        let state = test_state().await;
        let mut expert = bachata();
        expert.difficulty = "expert".into();
        assert!(add_video(&state, expert).await.is_err());

        let mut untitled = bachata();
        untitled.title = "  ".into();
        assert!(add_video(&state, untitled).await.is_err());

        assert_eq!(state.db.count_videos().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_get_missing_video() {
        let state = test_state().await;
        let err = get_video(&state, 999).await.unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[tokio::test]
    async fn test_favorites_follow_user() {
        let state = test_state().await;
        let videos = list_videos(&state, VideoArgs::default()).await.unwrap();
        assert_eq!(videos.len(), 4);

        let toggled = toggle_favorite(&state, videos[1].id).await.unwrap();
        assert!(toggled.is_favorite);
        let favorites = list_favorites(&state).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].user_id, state.user_id);

        let latin = list_videos(
            &state,
            VideoArgs {
                category: Some("latin".into()),
                ..VideoArgs::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(latin.len(), 1);
    }
}
