// ABOUTME: GitHub REST client backing the persona studio's repository publisher capability.
// ABOUTME: Reads request issues from one repository and opens persona pull requests in another.

pub mod client;
pub mod types;

pub use client::{GitHubClient, GitHubConfig, GitHubError};
