// src/context.rs

//! Request-scoped state carried from the interceptor chain into handlers.

use crate::userinfo::UserInfo;
use std::collections::HashSet;
use std::sync::Arc;
use tonic::metadata::MetadataMap;

/// Identity of the RPC being invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// The full method name, e.g. `/events.v1.EventService/ListEvents`.
    pub full_name: String,
}

impl MethodInfo {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self { full_name: full_name.into() }
    }
}

/// The permission strings granted to the caller of one request.
///
/// Built once during authentication and read-only afterwards. It lives inside
/// the `RequestContext`, so it is dropped together with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(permissions.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// The typed context of one inbound call.
///
/// Starts out holding only the inbound metadata; the interceptor chain stamps
/// the method name and, once authenticated, the caller's profile and
/// permissions. Handlers receive it by value.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    metadata: MetadataMap,
    method_info: Option<MethodInfo>,
    user_info: Option<Arc<UserInfo>>,
    permissions: Option<PermissionSet>,
}

impl RequestContext {
    pub fn new(metadata: MetadataMap) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn with_method_info(mut self, method_info: MethodInfo) -> Self {
        self.method_info = Some(method_info);
        self
    }

    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = Some(Arc::new(user_info));
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn method_info(&self) -> Option<&MethodInfo> {
        self.method_info.as_ref()
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_deref()
    }

    /// The caller's permissions, if the request went through authentication.
    pub fn permissions(&self) -> Option<&PermissionSet> {
        self.permissions.as_ref()
    }

    /// Returns the bearer token from the `authorization` metadata.
    ///
    /// A `Bearer ` or `bearer ` prefix is stripped. An absent header yields
    /// an empty string, which the provider then rejects.
    pub fn bearer_token(&self) -> &str {
        let Some(value) = self.metadata.get("authorization").and_then(|v| v.to_str().ok()) else {
            return "";
        };
        let token = value.strip_prefix("Bearer ").unwrap_or(value);
        token.strip_prefix("bearer ").unwrap_or(token)
    }
}
