//! GraphQL documents for organization and pull request discovery.

/// Organization repositories with open-PR counts, cursor paginated.
/// Also carries `totalCount` so the first page doubles as the repository
/// count.
pub const ORG_REPOSITORIES: &str = r"
query($org: String!, $reposCursor: String, $pageSize: Int!) {
  organization(login: $org) {
    repositories(first: $pageSize, after: $reposCursor) {
      totalCount
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        name
        isArchived
        pullRequests(states: OPEN) {
          totalCount
        }
      }
    }
  }
}
";

/// One page of a repository's open pull requests with merge state and the
/// last commit's status-check rollup.
pub const REPO_OPEN_PRS_PAGE: &str = r"
query($owner: String!, $name: String!, $prsCursor: String, $pageSize: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequests(states: OPEN, first: $pageSize, after: $prsCursor) {
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        number
        title
        body
        isDraft
        updatedAt
        headRefName
        baseRefName
        headRefOid
        mergeable
        mergeStateStatus
        commits(last: 1) {
          nodes {
            commit {
              statusCheckRollup {
                contexts(first: 100) {
                  nodes {
                    __typename
                    ... on CheckRun {
                      name
                      conclusion
                    }
                    ... on StatusContext {
                      context
                      state
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
";

/// A single pull request with the same status payload as the page query.
pub const PR_WITH_STATUS: &str = r"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      number
      title
      body
      isDraft
      updatedAt
      headRefName
      baseRefName
      headRefOid
      mergeable
      mergeStateStatus
      commits(last: 1) {
        nodes {
          commit {
            statusCheckRollup {
              contexts(first: 100) {
                nodes {
                  __typename
                  ... on CheckRun {
                    name
                    conclusion
                  }
                  ... on StatusContext {
                    context
                    state
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
";

/// Full message of a pull request's first commit.
pub const PR_FIRST_COMMIT: &str = r"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      commits(first: 1) {
        nodes {
          commit {
            message
          }
        }
      }
    }
  }
}
";
