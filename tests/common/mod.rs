#![allow(dead_code)]

use std::fs;
use std::path::Path;

use crm_insight::config::Config;

pub const CONTACTS: &str = "\
Id,Contact Owner Name,Created Time,Modified Time
C1,Anna Schmidt,01.03.2024 09:00,02.03.2024 10:00
C2,Jonas Weber,02.03.2024 11:30,02.03.2024 12:00
C3,Anna Schmidt,03.03.2024 08:15,
";

pub const CALLS: &str = "\
Id,Call Start Time,Call Owner Name,CONTACTID,Call Type,Call Duration (in seconds),Call Status,Outgoing Call Status,Scheduled in CRM
K1,01.03.2024 12:00,Anna Schmidt,C1,Outbound,180,Attended Dialled,Completed,0
K2,02.03.2024 13:00,Jonas Weber,C2,Outbound,0,Unattended Dialled,Completed,0
K3,03.03.2024 09:00,Anna Schmidt,C9,Inbound,60,Received,,1
";

pub const DEALS: &str = "\
Id,Deal Owner Name,Closing Date,Quality,Stage,Lost Reason,Page,Campaign,SLA,Content,Term (AdGroup),Source,Payment Type,Product,Education Type,Created Time,Course duration,Months of study,Initial Amount Paid,Offer Total Amount,Contact Name,City,Level of Deutsch
D1,Anna Schmidt,10.03.2024 00:00,A - High,Payment Done,,/web,spring_web,01:00:00,,web_dev,Google Ads,Recurring Payments,Web Developer,Morning,01.03.2024 10:00,6,6,1000,6000,C1,Berlin,B1
D2,Jonas Weber,05.03.2024 00:00,C - Low,Lost,Expensive,/web,spring_web,02:30:00,,web_dev,Facebook Ads,,Digital Marketing,Evening,02.03.2024 12:00,11,,,,C2,München,a2
D3,Anna Schmidt,,B - Medium,Call Delayed,,/ux,autumn_ux,,,,Google Ads,,UX/UI Design,,03.03.2024 09:00,,,,,C3,-,
,Nobody,,,New Lead,,,,,,,,,,,04.03.2024 09:00,,,,,,,
";

pub const SPEND: &str = "\
Date,Source,Campaign,Impressions,Spend,Clicks,AdGroup,Ad
01.03.2024,Google Ads,spring_web,1000,50.5,40,web_dev,ad1
02.03.2024,Facebook Ads,spring_web,2000,20,10,web_dev,ad2
03.03.2024,Google Ads,autumn_ux,500,10,5,,
";

/// Config whose directories all live under `root`, reading the CSV fixtures.
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.raw_dir = root.join("raw");
    config.paths.clean_dir = root.join("clean");
    config.paths.temp_dir = root.join("temp");
    config.paths.reports_dir = root.join("reports");
    config.paths.log_dir = root.join("logs");
    config.import.contacts_file = "Contacts.csv".to_string();
    config.import.calls_file = "Calls.csv".to_string();
    config.import.deals_file = "Deals.csv".to_string();
    config.import.spend_file = "Spend.csv".to_string();
    config
}

/// Write the raw exports; tables not listed in `skip` are created.
pub fn write_raw(config: &Config, skip: &[&str]) {
    fs::create_dir_all(&config.paths.raw_dir).unwrap();
    for (name, body) in [
        ("Contacts.csv", CONTACTS),
        ("Calls.csv", CALLS),
        ("Deals.csv", DEALS),
        ("Spend.csv", SPEND),
    ] {
        if !skip.contains(&name) {
            fs::write(config.paths.raw_dir.join(name), body).unwrap();
        }
    }
}
