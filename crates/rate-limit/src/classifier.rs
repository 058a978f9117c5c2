//! Maps an inbound operation to its tier.
//!
//! Classification is an ordered list of `(predicate, tier)` rules over the method, path
//! and query of an operation. The first matching rule wins; an operation matching none
//! of them falls into [`Classifier::DEFAULT_TIER`].

use std::collections::BTreeSet;

use config::{RouteConfig, Tier};
use http::{Method, Uri};

const LIKE_ACTIONS: [&str; 2] = ["like", "unlike"];
const REPLIES: &str = "replies";

/// Errors raised while building a classifier from route configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    /// The API prefix is not an absolute path.
    #[error("API prefix '{0}' must start with '/'")]
    InvalidApiPrefix(String),

    /// A resource name is empty or spans more than one path segment.
    #[error("Resource '{name}' in {list} must be a single, non-empty path segment")]
    InvalidResource {
        /// Configuration list the name came from.
        list: &'static str,
        /// The offending name.
        name: String,
    },

    /// Two resource-scoped rules would claim the same resource.
    #[error("Resource '{resource}' is listed in both {first} and {second}")]
    Overlap {
        /// The shared resource.
        resource: String,
        /// First list claiming it.
        first: &'static str,
        /// Second list claiming it.
        second: &'static str,
    },
}

/// The parts of an inbound operation classification looks at.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    /// Request method.
    pub method: &'a Method,
    /// Request path, without the query.
    pub path: &'a str,
    /// Raw query string, if any.
    pub query: Option<&'a str>,
}

impl<'a> Operation<'a> {
    /// Describe an operation by its method and URI.
    pub fn new(method: &'a Method, uri: &'a Uri) -> Self {
        Self {
            method,
            path: uri.path(),
            query: uri.query(),
        }
    }

    fn query_param_present(&self, name: &str) -> bool {
        let Some(query) = self.query else {
            return false;
        };

        url::form_urlencoded::parse(query.as_bytes()).any(|(key, value)| key == name && !value.is_empty())
    }
}

/// Condition of a classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// `POST` on the thought collection.
    ThoughtSubmission,
    /// `GET` on a search resource, or on the thought collection with a search term.
    Search,
    /// Any method on `<content>/<id>/like|unlike` or
    /// `<content>/<id>/replies/<reply>/like|unlike`.
    LikeToggle,
    /// A mutating method on a content resource or below it.
    ContentMutation,
    /// A mutating method on a notification resource or below it.
    NotificationMutation,
    /// `GET` or `HEAD` anywhere.
    Read,
    /// A mutating method anywhere.
    Mutation,
}

/// A single classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// When the rule applies.
    pub predicate: Predicate,
    /// Tier of the operations it matches.
    pub tier: Tier,
}

const RULES: [Rule; 7] = [
    Rule {
        predicate: Predicate::ThoughtSubmission,
        tier: Tier::MutateThought,
    },
    Rule {
        predicate: Predicate::Search,
        tier: Tier::GetSearch,
    },
    Rule {
        predicate: Predicate::LikeToggle,
        tier: Tier::InteractionLike,
    },
    Rule {
        predicate: Predicate::ContentMutation,
        tier: Tier::MutateContent,
    },
    Rule {
        predicate: Predicate::NotificationMutation,
        tier: Tier::InteractionNotificationUpdate,
    },
    Rule {
        predicate: Predicate::Read,
        tier: Tier::GetStandard,
    },
    Rule {
        predicate: Predicate::Mutation,
        tier: Tier::MutateStandard,
    },
];

/// Ordered rule list bound to a route layout.
#[derive(Debug, Clone)]
pub struct Classifier {
    api_prefix: Vec<String>,
    thought_path: String,
    search_paths: BTreeSet<String>,
    search_param: String,
    content_resources: BTreeSet<String>,
    notification_resources: BTreeSet<String>,
}

impl Classifier {
    /// Tier of an operation no rule matches.
    pub const DEFAULT_TIER: Tier = Tier::GetStandard;

    /// Build a classifier, rejecting layouts in which resource-scoped rules overlap.
    pub fn from_config(config: &RouteConfig) -> Result<Self, ClassifierError> {
        if !config.api_prefix.starts_with('/') {
            return Err(ClassifierError::InvalidApiPrefix(config.api_prefix.clone()));
        }

        let thought_path = segment("thought_path", &config.thought_path)?;
        let search_paths = segments("search_paths", &config.search_paths)?;
        let content_resources = segments("content_resources", &config.content_resources)?;
        let notification_resources = segments("notification_resources", &config.notification_resources)?;

        disjoint(&content_resources, "content_resources", &notification_resources, "notification_resources")?;
        disjoint(&search_paths, "search_paths", &content_resources, "content_resources")?;
        disjoint(&search_paths, "search_paths", &notification_resources, "notification_resources")?;

        let thought = BTreeSet::from([thought_path.clone()]);
        disjoint(&thought, "thought_path", &search_paths, "search_paths")?;
        disjoint(&thought, "thought_path", &notification_resources, "notification_resources")?;

        Ok(Self {
            api_prefix: config
                .api_prefix
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
            thought_path,
            search_paths,
            search_param: config.search_param.clone(),
            content_resources,
            notification_resources,
        })
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &'static [Rule] {
        &RULES
    }

    /// Tier of `operation`. Pure: the same operation always yields the same tier.
    pub fn classify(&self, operation: &Operation<'_>) -> Tier {
        let segments = self.api_segments(operation.path);

        RULES
            .iter()
            .find(|rule| self.matches(rule.predicate, operation, segments.as_deref()))
            .map(|rule| rule.tier)
            .unwrap_or(Self::DEFAULT_TIER)
    }

    /// Path segments below the API prefix, or `None` for paths outside the API.
    ///
    /// Matching happens on the normalized path, the one the protected service routes.
    fn api_segments<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let mut segments = normalized_segments(path);

        let inside = segments.len() >= self.api_prefix.len()
            && segments.iter().zip(&self.api_prefix).all(|(segment, prefix)| segment == prefix);

        if !inside {
            return None;
        }

        Some(segments.split_off(self.api_prefix.len()))
    }

    fn matches(&self, predicate: Predicate, operation: &Operation<'_>, segments: Option<&[&str]>) -> bool {
        let method = operation.method;

        match predicate {
            Predicate::ThoughtSubmission => method == Method::POST && self.is_thought_collection(segments),
            Predicate::Search => {
                if method != Method::GET {
                    return false;
                }

                let on_search_path = matches!(segments, Some([first, ..]) if self.search_paths.contains(*first));

                on_search_path
                    || (self.is_thought_collection(segments) && operation.query_param_present(&self.search_param))
            }
            Predicate::LikeToggle => match segments {
                Some([resource, _, action]) | Some([resource, _, REPLIES, _, action]) => {
                    self.content_resources.contains(*resource) && LIKE_ACTIONS.contains(action)
                }
                _ => false,
            },
            Predicate::ContentMutation => is_mutating(method) && under(segments, &self.content_resources),
            Predicate::NotificationMutation => is_mutating(method) && under(segments, &self.notification_resources),
            Predicate::Read => method == Method::GET || method == Method::HEAD,
            Predicate::Mutation => is_mutating(method),
        }
    }

    fn is_thought_collection(&self, segments: Option<&[&str]>) -> bool {
        matches!(segments, Some([only]) if *only == self.thought_path)
    }
}

fn is_mutating(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
}

/// Non-empty path segments after dot-segment removal (RFC 3986, section 5.2.4).
/// Repeated slashes collapse, `.` is dropped and `..` removes the previous segment.
/// Percent-encoded dots count as dots.
fn normalized_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();

    for segment in path.split('/') {
        match dot_segment(segment) {
            Some(DotSegment::Current) => {}
            Some(DotSegment::Parent) => {
                segments.pop();
            }
            None if segment.is_empty() => {}
            None => segments.push(segment),
        }
    }

    segments
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    if !segment.starts_with(['.', '%']) || segment.len() > 6 {
        return None;
    }

    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}

fn under(segments: Option<&[&str]>, resources: &BTreeSet<String>) -> bool {
    matches!(segments, Some([first, ..]) if resources.contains(*first))
}

fn segment(list: &'static str, name: &str) -> Result<String, ClassifierError> {
    let trimmed = name.trim_matches('/');

    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(ClassifierError::InvalidResource {
            list,
            name: name.to_string(),
        });
    }

    Ok(trimmed.to_string())
}

fn segments(list: &'static str, names: &[String]) -> Result<BTreeSet<String>, ClassifierError> {
    names.iter().map(|name| segment(list, name)).collect()
}

fn disjoint(
    left: &BTreeSet<String>,
    first: &'static str,
    right: &BTreeSet<String>,
    second: &'static str,
) -> Result<(), ClassifierError> {
    match left.intersection(right).next() {
        Some(resource) => Err(ClassifierError::Overlap {
            resource: resource.clone(),
            first,
            second,
        }),
        None => Ok(()),
    }
}
