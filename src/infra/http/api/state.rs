use std::sync::Arc;

use crate::application::blog::BlogService;

#[derive(Clone)]
pub struct ApiState {
    pub blog: Arc<BlogService>,
}

impl ApiState {
    pub fn new(blog: Arc<BlogService>) -> Self {
        Self { blog }
    }
}
