//! In-memory repositories with call counters for service tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::pagination::{LatestCursor, PageRequest, PopularityCursor};
use crate::application::repos::{
    FeedRepo, LikesRepo, LikesWriteRepo, RepoError, VideosRepo, VideosWriteRepo,
};
use crate::domain::entities::{NewVideo, VideoRecord};

pub(crate) fn video(id: i64, author_id: i64, created_at: OffsetDateTime, likes: i64) -> VideoRecord {
    VideoRecord {
        id,
        author_id,
        username: format!("user{author_id}"),
        title: format!("video {id}"),
        description: None,
        play_url: format!("https://cdn.test/{id}.mp4"),
        cover_url: format!("https://cdn.test/{id}.jpg"),
        likes_count: likes,
        popularity: likes,
        created_at,
    }
}

#[derive(Default)]
pub(crate) struct StubStore {
    videos: Mutex<Vec<VideoRecord>>,
    likes: Mutex<HashSet<(i64, i64)>>,
    follows: Mutex<HashSet<(i64, i64)>>,
    next_id: AtomicI64,
    pub feed_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub like_lookups: AtomicUsize,
}

impl StubStore {
    pub fn with_videos(videos: Vec<VideoRecord>) -> Self {
        let next_id = videos.iter().map(|video| video.id).max().unwrap_or(0) + 1;
        Self {
            videos: Mutex::new(videos),
            next_id: AtomicI64::new(next_id),
            ..Self::default()
        }
    }

    pub fn follow(&self, follower_id: i64, vlogger_id: i64) {
        self.follows
            .lock()
            .unwrap()
            .insert((follower_id, vlogger_id));
    }

    pub fn add_like(&self, video_id: i64, account_id: i64) {
        self.likes.lock().unwrap().insert((video_id, account_id));
    }

    pub fn rename(&self, id: i64, title: &str) {
        let mut videos = self.videos.lock().unwrap();
        if let Some(video) = videos.iter_mut().find(|video| video.id == id) {
            video.title = title.to_string();
        }
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn like_lookups(&self) -> usize {
        self.like_lookups.load(Ordering::SeqCst)
    }

    fn scan_latest(
        &self,
        page: PageRequest<LatestCursor>,
        keep: impl Fn(&VideoRecord) -> bool,
    ) -> Vec<VideoRecord> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows: Vec<VideoRecord> = self
            .videos
            .lock()
            .unwrap()
            .iter()
            .filter(|row| keep(*row))
            .filter(|row| match &page.cursor {
                None => true,
                Some(cursor) => match cursor.id() {
                    Some(id) => {
                        row.created_at < cursor.before()
                            || (row.created_at == cursor.before() && row.id < id)
                    }
                    None => row.created_at < cursor.before(),
                },
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(page.limit as usize);
        rows
    }
}

#[async_trait]
impl FeedRepo for StubStore {
    async fn list_latest(
        &self,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        Ok(self.scan_latest(page, |_| true))
    }

    async fn list_by_popularity(
        &self,
        page: PageRequest<PopularityCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows: Vec<VideoRecord> = self
            .videos
            .lock()
            .unwrap()
            .iter()
            .filter(|row| match &page.cursor {
                None => true,
                Some(cursor) => {
                    row.likes_count < cursor.likes_count()
                        || (row.likes_count == cursor.likes_count() && row.id < cursor.id())
                }
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.likes_count.cmp(&a.likes_count).then(b.id.cmp(&a.id)));
        rows.truncate(page.limit as usize);
        Ok(rows)
    }

    async fn list_by_following(
        &self,
        follower_id: i64,
        page: PageRequest<LatestCursor>,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let followed: HashSet<i64> = self
            .follows
            .lock()
            .unwrap()
            .iter()
            .filter(|(follower, _)| *follower == follower_id)
            .map(|(_, vlogger)| *vlogger)
            .collect();
        Ok(self.scan_latest(page, |row| followed.contains(&row.author_id)))
    }
}

#[async_trait]
impl LikesRepo for StubStore {
    async fn liked_among(
        &self,
        account_id: i64,
        video_ids: &[i64],
    ) -> Result<HashSet<i64>, RepoError> {
        self.like_lookups.fetch_add(1, Ordering::SeqCst);
        let likes = self.likes.lock().unwrap();
        Ok(video_ids
            .iter()
            .copied()
            .filter(|id| likes.contains(&(*id, account_id)))
            .collect())
    }
}

#[async_trait]
impl VideosRepo for StubStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<VideoRecord>, RepoError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .videos
            .lock()
            .unwrap()
            .iter()
            .find(|video| video.id == id)
            .cloned())
    }
}

#[async_trait]
impl VideosWriteRepo for StubStore {
    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, RepoError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = VideoRecord {
            id,
            author_id: video.author_id,
            username: format!("user{}", video.author_id),
            title: video.title,
            description: video.description,
            play_url: video.play_url,
            cover_url: video.cover_url,
            likes_count: 0,
            popularity: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        self.videos.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete_video(&self, id: i64) -> Result<(), RepoError> {
        let mut videos = self.videos.lock().unwrap();
        let before = videos.len();
        videos.retain(|video| video.id != id);
        if videos.len() == before {
            return Err(RepoError::NotFound);
        }
        self.likes
            .lock()
            .unwrap()
            .retain(|(video_id, _)| *video_id != id);
        Ok(())
    }
}

#[async_trait]
impl LikesWriteRepo for StubStore {
    async fn like(&self, video_id: i64, account_id: i64) -> Result<(), RepoError> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .iter_mut()
            .find(|video| video.id == video_id)
            .ok_or(RepoError::NotFound)?;
        if !self.likes.lock().unwrap().insert((video_id, account_id)) {
            return Err(RepoError::Duplicate {
                constraint: "likes_video_account_key".to_string(),
            });
        }
        video.likes_count += 1;
        Ok(())
    }

    async fn unlike(&self, video_id: i64, account_id: i64) -> Result<(), RepoError> {
        if !self.likes.lock().unwrap().remove(&(video_id, account_id)) {
            return Err(RepoError::NotFound);
        }
        let mut videos = self.videos.lock().unwrap();
        if let Some(video) = videos.iter_mut().find(|video| video.id == video_id) {
            video.likes_count = (video.likes_count - 1).max(0);
        }
        Ok(())
    }
}
