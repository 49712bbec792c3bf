pub mod community_reports;
