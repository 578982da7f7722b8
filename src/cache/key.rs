use std::fmt;

/// Identifies one cached result set.
///
/// Equality is structural: two keys built from the same segments name the
/// same partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// The global feed, `("posts")`
  Posts,
  /// One author's posts, `("userPosts", username)`
  UserPosts(String),
}

impl QueryKey {
  pub fn user_posts(username: impl Into<String>) -> Self {
    Self::UserPosts(username.into())
  }

  /// The key as an ordered tuple of segments.
  pub fn segments(&self) -> Vec<&str> {
    match self {
      Self::Posts => vec!["posts"],
      Self::UserPosts(username) => vec!["userPosts", username.as_str()],
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Posts => "all posts".to_string(),
      Self::UserPosts(username) => format!("posts by {}", username),
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.segments().join("/"))
  }
}
