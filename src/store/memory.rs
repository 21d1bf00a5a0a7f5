use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ContentStore, StoreError, comment_not_found, post_not_found};
use crate::models::{
    comment::{Comment, NewComment},
    pagination::Page,
    post::{NewPost, Post, PostChanges, PostStatus},
    user::{NewUser, User},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// [`ContentStore`] kept in process memory. Mirrors the Postgres schema's
/// uniqueness (username, case-insensitive email, slug) and cascade rules.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; ties broken by id so inserts in the same instant stay ordered.
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn paginate<T: Clone>(items: &[T], page: Page) -> Vec<T> {
    items
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict(format!(
                "Username '{}' already exists",
                new.username
            )));
        }
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::Conflict("Email already registered.".to_string()));
        }

        let user = User {
            id: tables.next_id(),
            username: new.username,
            email: new.email,
            password: new.password,
            role: new.role,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn create_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.posts.values().any(|p| p.slug == new.slug) {
            return Err(StoreError::Conflict(format!(
                "Slug '{}' already exists",
                new.slug
            )));
        }

        let now = Utc::now();
        let post = Post {
            id: tables.next_id(),
            title: new.title,
            slug: new.slug,
            author_id: new.author_id,
            body: new.body,
            status: new.status,
            auto_response_text: new.auto_response_text,
            response_delay_minutes: new.response_delay_minutes,
            blocked_comment_count: 0,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: i64) -> Result<Post, StoreError> {
        let tables = self.tables.read().await;
        tables.posts.get(&id).cloned().ok_or_else(post_not_found)
    }

    async fn get_post_by_slug(&self, slug: &str) -> Result<Post, StoreError> {
        let tables = self.tables.read().await;
        tables
            .posts
            .values()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or_else(post_not_found)
    }

    async fn list_published_posts(&self, page: Page) -> Result<(Vec<Post>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Published)
            .cloned()
            .collect();
        newest_first(&mut posts, |p| (p.created_at, p.id));

        Ok((paginate(&posts, page), posts.len() as i64))
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(slug) = &changes.slug {
            if tables.posts.values().any(|p| p.id != id && &p.slug == slug) {
                return Err(StoreError::Conflict(format!("Slug '{}' already exists", slug)));
            }
        }

        let post = tables.posts.get_mut(&id).ok_or_else(post_not_found)?;
        changes.apply_to(post);
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn increment_blocked_comments(&self, post_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let post = tables.posts.get_mut(&post_id).ok_or_else(post_not_found)?;
        post.blocked_comment_count += 1;
        Ok(())
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.posts.remove(&id).ok_or_else(post_not_found)?;
        tables.comments.retain(|_, c| c.post_id != id);
        Ok(())
    }

    async fn create_comment(&self, new: NewComment) -> Result<Comment, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&new.post_id) {
            return Err(post_not_found());
        }
        if let Some(parent_id) = new.parent_id {
            if !tables.comments.contains_key(&parent_id) {
                return Err(StoreError::NotFound("Parent comment not found".to_string()));
            }
        }

        let comment = Comment {
            id: tables.next_id(),
            post_id: new.post_id,
            author_id: new.author_id,
            body: new.body,
            parent_id: new.parent_id,
            created_at: Utc::now(),
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: i64) -> Result<Comment, StoreError> {
        let tables = self.tables.read().await;
        tables.comments.get(&id).cloned().ok_or_else(comment_not_found)
    }

    async fn list_comments(&self, page: Page) -> Result<(Vec<Comment>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables.comments.values().cloned().collect();
        newest_first(&mut comments, |c| (c.created_at, c.id));

        Ok((paginate(&comments, page), comments.len() as i64))
    }

    async fn comments_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        newest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn comments_created_between(
        &self,
        post_id: i64,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Comment>, StoreError> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.created_at >= from && c.created_at < until)
            .cloned()
            .collect();
        newest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn update_comment_body(&self, id: i64, body: String) -> Result<Comment, StoreError> {
        let mut tables = self.tables.write().await;
        let comment = tables.comments.get_mut(&id).ok_or_else(comment_not_found)?;
        comment.body = body;
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&id) {
            return Err(comment_not_found());
        }

        // Collect the whole reply subtree before removing anything.
        let mut doomed = BTreeSet::from([id]);
        loop {
            let before = doomed.len();
            for comment in tables.comments.values() {
                if comment.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(comment.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        tables.comments.retain(|id, _| !doomed.contains(id));
        Ok(())
    }
}
