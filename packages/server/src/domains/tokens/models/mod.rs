mod slack_token;

pub use slack_token::SlackToken;
