use clap::{Arg, ArgMatches, Command};
use itertools::Itertools;
use rpassword::prompt_password;
use std::error::Error;
use std::path::PathBuf;

use usergate::accounts::{ResendVerifyForm, SignupForm};
use usergate::mail::SmtpPasswordStore;
use usergate::utils::logging::initialize_logging;
use usergate::utils::time::{format_optional, format_timestamp};
use usergate::{AccountError, AccountService, RequestContext, Settings, SETTINGS_FILE};

fn cli() -> Command {
    Command::new("usergate")
        .about("User registration, email verification and outgoing mail tracking")
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to the JSON settings file")
                .value_name("FILE")
                .default_value(SETTINGS_FILE),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("register")
                .about("Register a new account")
                .arg(Arg::new("email").help("Email address").required(true))
                .arg(Arg::new("name").help("Display name").required(true)),
        )
        .subcommand(
            Command::new("verify")
                .about("Activate an account with its verification code")
                .arg(Arg::new("code").help("Verification code").required(true)),
        )
        .subcommand(
            Command::new("resend")
                .about("Send a new verification mail")
                .arg(Arg::new("email").help("Email address").required(true)),
        )
        .subcommand(
            Command::new("login")
                .about("Check an email and password")
                .arg(Arg::new("email").help("Email address").required(true)),
        )
        .subcommand(Command::new("users").about("List all accounts"))
        .subcommand(Command::new("mails").about("List outgoing mail records"))
        .subcommand(
            Command::new("received")
                .about("Mark a sent mail as received")
                .arg(
                    Arg::new("id")
                        .help("Outgoing mail id")
                        .required(true)
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("send")
                .about("Send a mail through the configured transport and record it")
                .arg(Arg::new("to").help("Recipient address").required(true))
                .arg(Arg::new("subject").help("Subject line").required(true))
                .arg(Arg::new("body").help("Plain text body").required(true))
                .arg(
                    Arg::new("cc")
                        .long("cc")
                        .help("Carbon copy address")
                        .value_name("ADDRESS"),
                ),
        )
        .subcommand(
            Command::new("set-smtp-password")
                .about("Store the SMTP password in the system keyring"),
        )
        .subcommand(
            Command::new("clear-smtp-password")
                .about("Remove the SMTP password from the system keyring"),
        )
}

/// Print field errors the way a form would show them
fn report(error: AccountError) -> Result<(), Box<dyn Error>> {
    match error {
        AccountError::Validation(errors) => {
            for field in errors.fields() {
                for message in errors.get(field) {
                    println!("{}: {}", field, message);
                }
            }
            Ok(())
        }
        AccountError::AuthFailure | AccountError::NotPermitted => {
            println!("{}", error);
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn run(matches: &ArgMatches, settings: &Settings) -> Result<(), Box<dyn Error>> {
    if matches.subcommand_matches("set-smtp-password").is_some() {
        let smtp = settings
            .mail
            .smtp
            .as_ref()
            .ok_or("No SMTP relay configured in the settings file")?;
        let password = prompt_password(format!("SMTP password for {}: ", smtp.username))?;
        SmtpPasswordStore::new(&smtp.username)?.store(&password)?;
        println!("SMTP password stored in the system keyring");
        return Ok(());
    }

    if matches.subcommand_matches("clear-smtp-password").is_some() {
        let smtp = settings
            .mail
            .smtp
            .as_ref()
            .ok_or("No SMTP relay configured in the settings file")?;
        SmtpPasswordStore::new(&smtp.username)?.delete()?;
        println!("SMTP password removed from the system keyring");
        return Ok(());
    }

    let service = AccountService::from_settings(settings)?;
    let ctx = RequestContext::anonymous();

    match matches.subcommand() {
        Some(("register", sub)) => {
            let email = sub.get_one::<String>("email").ok_or("email is required")?;
            let name = sub.get_one::<String>("name").ok_or("name is required")?;
            let password = prompt_password("Password: ")?;
            let password_confirm = prompt_password("Confirm password: ")?;

            let form = SignupForm::new(email, name, &password, &password_confirm);
            match service.register(&ctx, &form) {
                Ok(user) if user.is_admin => {
                    println!("Admin account {} created and active.", user.slug)
                }
                Ok(_) => println!("Signup success. Please check your email to verify your account."),
                Err(e) => report(e)?,
            }
        }
        Some(("verify", sub)) => {
            let code = sub.get_one::<String>("code").ok_or("code is required")?;
            match service.verify_by_code(&ctx, code) {
                Ok(user) => println!("Account {} has been verified.", user.email),
                Err(e) => report(e)?,
            }
        }
        Some(("resend", sub)) => {
            let email = sub.get_one::<String>("email").ok_or("email is required")?;
            match service.resend_verification(&ctx, &ResendVerifyForm::new(email)) {
                Ok(_) => println!("Verification link has been sent. Please check your email."),
                Err(e) => report(e)?,
            }
        }
        Some(("login", sub)) => {
            let email = sub.get_one::<String>("email").ok_or("email is required")?;
            let password = prompt_password("Password: ")?;
            match service.authenticate(email, &password) {
                Ok(user) => println!("Successfully logged in as {}.", user.email),
                Err(e) => report(e)?,
            }
        }
        Some(("users", _)) => {
            let users = service.users()?;
            if users.is_empty() {
                println!("No users registered.");
            }
            for user in users.iter().sorted_by_key(|user| user.id) {
                println!(
                    "#{} {} <{}> slug={} status={} admin={} created={} last_request={}",
                    user.id,
                    user.name,
                    user.email,
                    user.slug,
                    user.status,
                    user.is_admin,
                    format_timestamp(&user.audit.created_at),
                    format_optional(user.last_request_at.as_ref())
                );
            }
        }
        Some(("mails", _)) => {
            let mails = service.outgoing_mails()?;
            if mails.is_empty() {
                println!("No outgoing mail recorded.");
            }
            for mail in mails.iter().sorted_by_key(|mail| mail.id) {
                println!(
                    "#{} to={} subject={:?} status={} sent={}",
                    mail.id,
                    mail.email_to,
                    mail.subject,
                    mail.status,
                    format_optional(mail.send_at.as_ref())
                );
            }
        }
        Some(("received", sub)) => {
            let id = *sub.get_one::<u64>("id").ok_or("id is required")?;
            let mail = service
                .mailer()
                .mark_received(service.store(), id, ctx.current_user)?;
            println!("Mail #{} marked as {}.", mail.id, mail.status);
        }
        Some(("send", sub)) => {
            let to = sub.get_one::<String>("to").ok_or("to is required")?;
            let subject = sub.get_one::<String>("subject").ok_or("subject is required")?;
            let body = sub.get_one::<String>("body").ok_or("body is required")?;

            let mut mail = service.mailer().compose(subject, to, body, None);
            if let Some(cc) = sub.get_one::<String>("cc") {
                mail = mail.with_cc(cc);
            }
            let mail = service
                .mailer()
                .send_email(service.store(), mail, ctx.current_user)?;
            println!("Mail #{} to {} is {}.", mail.id, mail.email_to, mail.status);
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

fn main() {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));

    let mut settings = match Settings::load(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    settings.apply_env();

    if let Err(e) = initialize_logging(&settings.log) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    if let Err(e) = run(&matches, &settings) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_register() {
        let matches = cli()
            .try_get_matches_from(["usergate", "register", "a@b.com", "A"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("config").map(String::as_str),
            Some(SETTINGS_FILE)
        );
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "register");
        assert_eq!(sub.get_one::<String>("email").unwrap(), "a@b.com");
    }

    #[test]
    fn test_parse_send_with_cc() {
        let matches = cli()
            .try_get_matches_from([
                "usergate", "send", "a@b.com", "Hello", "Body", "--cc", "c@d.com",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "send");
        assert_eq!(sub.get_one::<String>("cc").unwrap(), "c@d.com");
        assert!(cli()
            .try_get_matches_from(["usergate", "send", "a@b.com"])
            .is_err());
    }

    #[test]
    fn test_received_requires_numeric_id() {
        assert!(cli()
            .try_get_matches_from(["usergate", "received", "abc"])
            .is_err());
        let matches = cli()
            .try_get_matches_from(["usergate", "--config", "x.json", "received", "7"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<u64>("id"), Some(&7));
    }
}
